// ==============================================================================
// context.rs - Engine Context
// ==============================================================================
// Description: Explicitly constructed engine state with request operations
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Lifecycle:
//   open()  → stores loaded, tools wired, stale merge temporaries swept
//   values() / tracks() / plot() / resolve() from any number of tasks
//   close() → waits for in-flight tool invocations, refuses new ones
//
// Request pipeline (causal order):
//   resolve genotypes → locate tracks → extract values | merge groups
// ==============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, record_failures, PeakStatistics};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::extractor::{selects_track, SignalExtractor};
use crate::locator::TrackLocator;
use crate::merge_cache::{sweep_stale_temporaries, MergeCacheManager, PeakTracks};
use crate::models::{GenotypeRecord, Peak, TrackReference};
use crate::plot::render_boxplots;
use crate::resolver::GenotypeResolver;
use crate::stores::{CsvTrackMetadata, SqliteVariantStore, TrackMetadataStore, VariantStore};
use crate::tools::{
    BigWigInfo, BigWigMerger, BigWigSummary, ChromLengthLookup, ProcessRunner, SignalSummarizer,
    ToolLimiter, ToolRunner, TrackMerger,
};
use crate::values_cache::{RedisValuesCache, ValuesCache};

/// Collaborators an engine is assembled from
pub struct Collaborators {
    pub variants: Arc<dyn VariantStore>,
    pub metadata: Arc<dyn TrackMetadataStore>,
    pub summarizer: Arc<dyn SignalSummarizer>,
    pub merger: Arc<dyn TrackMerger>,
    pub chrom_lengths: Arc<dyn ChromLengthLookup>,
    pub values_cache: Option<Arc<dyn ValuesCache>>,
}

/// Shared engine handle; cheap to clone across tasks
#[derive(Clone)]
pub struct EngineContext {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    resolver: GenotypeResolver,
    locator: TrackLocator,
    extractor: SignalExtractor,
    merge_cache: MergeCacheManager,
    values_cache: Option<Arc<dyn ValuesCache>>,
    limiter: ToolLimiter,
    closed: AtomicBool,
}

impl EngineContext {
    /// Open stores and tools described by the configuration
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.merged_tracks_dir)
            .await
            .map_err(|e| EngineError::io(&config.merged_tracks_dir, e))?;
        sweep_stale_temporaries(&config.merged_tracks_dir, config.stale_temp_age)?;

        let variants = SqliteVariantStore::open(&config.variant_db)?;
        variants.validate()?;
        let metadata = CsvTrackMetadata::load(&config.track_metadata)?;

        let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner);
        let tools = &config.tools;

        let values_cache: Option<Arc<dyn ValuesCache>> = match &config.redis_url {
            Some(url) => match RedisValuesCache::connect(url, config.values_ttl).await {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    warn!("Values cache unavailable, continuing without it: {}", e);
                    None
                }
            },
            None => None,
        };

        let collaborators = Collaborators {
            variants: Arc::new(variants),
            metadata: Arc::new(metadata),
            summarizer: Arc::new(BigWigSummary::new(Arc::clone(&runner), &tools.summary_bin)),
            merger: Arc::new(BigWigMerger::new(Arc::clone(&runner), &tools.merge_bin)),
            chrom_lengths: Arc::new(BigWigInfo::new(runner, &tools.chrom_sizes_bin)),
            values_cache,
        };

        Ok(Self::with_collaborators(config, collaborators))
    }

    /// Assemble an engine from already-built collaborators
    pub fn with_collaborators(config: EngineConfig, parts: Collaborators) -> Self {
        let limiter = ToolLimiter::new(config.tool_permits);

        let merge_cache = MergeCacheManager::new(
            config.merged_tracks_dir.clone(),
            parts.merger,
            parts.chrom_lengths,
            limiter.clone(),
            config.merge_padding,
            config.extract_parallelism,
        );

        info!(
            "Engine ready ({} tool permits, fan-out {}, values cache {})",
            config.tool_permits,
            config.extract_parallelism,
            if parts.values_cache.is_some() { "on" } else { "off" }
        );

        Self {
            inner: Arc::new(EngineInner {
                resolver: GenotypeResolver::new(parts.variants, config.variant_filter),
                locator: TrackLocator::new(parts.metadata),
                extractor: SignalExtractor::new(
                    parts.summarizer,
                    limiter.clone(),
                    config.extract_parallelism,
                ),
                merge_cache,
                values_cache: parts.values_cache,
                limiter,
                closed: AtomicBool::new(false),
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }
        Ok(())
    }

    /// Genotype of every cohort sample at a 1-based position
    pub async fn resolve(
        &self,
        chrom: &str,
        position: u64,
    ) -> EngineResult<BTreeMap<String, GenotypeRecord>> {
        self.ensure_open()?;
        self.inner.resolver.resolve(chrom, position).await
    }

    /// Located tracks for a peak, or `None` when the result is degenerate
    async fn located(&self, peak: &Peak) -> EngineResult<Option<Vec<TrackReference>>> {
        let genotypes = match self.resolve(&peak.snp.chrom, peak.snp.position).await {
            Ok(g) => g,
            Err(e) if e.is_recoverable() => {
                warn!("Peak {}: {}", peak.id, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if genotypes.is_empty() {
            let e = EngineError::Consistency(format!("no samples resolved for {}", peak.snp.id));
            warn!("Peak {}: {}", peak.id, e);
            return Ok(None);
        }

        let tracks = self.inner.locator.locate(&genotypes, peak);
        if tracks.is_empty() {
            warn!("Peak {}: no {} tracks for resolved samples", peak.id, peak.assay);
            return Ok(None);
        }

        Ok(Some(tracks))
    }

    /// Group statistics for a peak, memoised in the values cache
    ///
    /// Tracks whose summary failed are counted in their group's `failed`
    /// field; such partial results are returned but never cached.
    pub async fn values(&self, peak: &Peak) -> EngineResult<PeakStatistics> {
        self.ensure_open()?;
        info!("Computing values for peak {} ({} / {})", peak.id, peak.snp.id, peak.assay);

        if let Some(stats) = self.cached_values(peak.id).await {
            return Ok(stats);
        }

        let Some(tracks) = self.located(peak).await? else {
            return Ok(PeakStatistics::default());
        };

        let strand_aware = self.inner.config.is_strand_aware(&peak.assay);
        let extraction = self
            .inner
            .extractor
            .extract(tracks, &peak.feature, strand_aware)
            .await;

        let mut stats = aggregate(&extraction.values);
        record_failures(&mut stats, extraction.failures.iter().map(|f| &f.track));

        if extraction.failures.is_empty() {
            self.store_values(peak.id, &stats).await;
        } else {
            warn!(
                "Peak {}: {} track(s) failed, result not cached",
                peak.id,
                extraction.failures.len()
            );
        }

        Ok(stats)
    }

    /// Merged tracks per (condition, genotype class) group
    pub async fn tracks(&self, peak: &Peak) -> EngineResult<PeakTracks> {
        self.ensure_open()?;
        info!("Merging tracks for peak {} ({} / {})", peak.id, peak.snp.id, peak.assay);

        let Some(tracks) = self.located(peak).await? else {
            return Ok(PeakTracks::default());
        };

        let strand_aware = self.inner.config.is_strand_aware(&peak.assay);
        let selected: Vec<TrackReference> = tracks
            .into_iter()
            .filter(|t| selects_track(t, &peak.feature, strand_aware))
            .collect();

        Ok(self.inner.merge_cache.merge_tracks(&selected, &peak.feature).await)
    }

    /// SVG box plots of a peak's group statistics
    pub async fn plot(&self, peak: &Peak) -> EngineResult<String> {
        let stats = self.values(peak).await?;
        Ok(render_boxplots(&stats))
    }

    async fn cached_values(&self, peak_id: i64) -> Option<PeakStatistics> {
        let cache = self.inner.values_cache.as_ref()?;
        match cache.get(peak_id).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Values cache read failed for peak {}: {}", peak_id, e);
                None
            }
        }
    }

    async fn store_values(&self, peak_id: i64, stats: &PeakStatistics) {
        let Some(cache) = self.inner.values_cache.as_ref() else {
            return;
        };
        match cache.put(peak_id, stats).await {
            Ok(()) => debug!("Cached values for peak {}", peak_id),
            Err(e) => warn!("Values cache write failed for peak {}: {}", peak_id, e),
        }
    }

    /// Stop accepting requests and wait for in-flight tools to finish
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Closing engine, waiting for in-flight tool invocations");
        self.inner.limiter.close().await;
        info!("Engine closed");
    }
}
