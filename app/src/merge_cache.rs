// ==============================================================================
// merge_cache.rs - Merge-Cache Manager
// ==============================================================================
// Description: Content-addressed cache of per-group merged signal tracks
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Cache layout (flat directory, the files themselves are the index):
//   <sha256>.bw        merged track
//   <sha256>-dev.bw    deviation track (only when more than one input)
//   *.tmp              in-progress writes, renamed into place when complete
//                      (other processes may be writing them; only old ones
//                      are swept)
//
// Key: sha256 over the JSON tuple (sorted paths, chrom, start, end)
//
// Entry lifecycle:
//   Requested → CacheHit
//   Requested → Computing (holds a tool permit) → Ready
//   Requested → Computing → Failed (nothing cached, next request retries)
// ==============================================================================

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    normalize_chrom, ByCondition, ByGenotype, Condition, Feature, GenomicWindow, GenotypeClass,
    TrackReference,
};
use crate::tools::{ChromLengthLookup, MergeRequest, ToolLimiter, TrackMerger};

const MERGED_EXTENSION: &str = "bw";
const DEVIATION_SUFFIX: &str = "-dev";
const TEMP_EXTENSION: &str = "tmp";
const URL_PREFIX: &str = "/merged";

/// Handle to a ready merge-cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedTrack {
    pub path: PathBuf,
    pub url: String,
    pub deviation: Option<PathBuf>,
    /// True when served from an existing entry without running the merger
    pub cached: bool,
}

/// Outcome of merging one (condition, genotype class) group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupMerge {
    Ready(MergedTrack),
    /// No tracks contributed to the group
    #[default]
    Empty,
    Failed { message: String },
}

/// condition → genotype class → merge outcome
pub type PeakTracks = ByCondition<ByGenotype<GroupMerge>>;

/// Cache key over the canonical (sorted paths, chrom, start, end) tuple
pub fn cache_key(paths: &[PathBuf], window: &GenomicWindow) -> EngineResult<String> {
    let mut sorted: Vec<String> = paths.iter().map(|p| p.to_string_lossy().to_string()).collect();
    sorted.sort();
    sorted.dedup();

    let canonical = serde_json::to_vec(&(sorted, &window.chrom, window.start, window.end))?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Feature interval padded on both sides, clamped to [0, chrom_length)
pub fn merge_window(feature: &Feature, padding: u64, chrom_length: u64) -> GenomicWindow {
    let start = feature.start.saturating_sub(padding);
    let end = feature.end.saturating_add(padding).min(chrom_length);

    GenomicWindow::new(normalize_chrom(&feature.chrom), start.min(end), end)
}

/// Remove `*.tmp` files left behind by interrupted merges
///
/// The directory is shared between processes, so a temporary is only
/// removed once it has gone unmodified for `older_than`.
pub fn sweep_stale_temporaries(dir: &Path, older_than: Duration) -> EngineResult<usize> {
    let mut removed = 0usize;
    let now = SystemTime::now();

    for entry in WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(TEMP_EXTENSION) {
            continue;
        }

        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(modified) => modified,
            None => {
                debug!("Skipping temporary with unreadable mtime {:?}", path);
                continue;
            }
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < older_than {
            debug!("Keeping recent temporary {:?} ({}s old)", path, age.as_secs());
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {}
            // Renamed or discarded by its writer since the listing
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(EngineError::io(path, e)),
        }
        debug!("Removed stale temporary {:?}", path);
        removed += 1;
    }

    if removed > 0 {
        info!("Swept {} stale merge temporaries from {:?}", removed, dir);
    }
    Ok(removed)
}

#[derive(Clone)]
pub struct MergeCacheManager {
    dir: PathBuf,
    merger: Arc<dyn TrackMerger>,
    chrom_lengths: Arc<dyn ChromLengthLookup>,
    limiter: ToolLimiter,
    padding: u64,
    parallelism: usize,
}

impl MergeCacheManager {
    pub fn new(
        dir: impl Into<PathBuf>,
        merger: Arc<dyn TrackMerger>,
        chrom_lengths: Arc<dyn ChromLengthLookup>,
        limiter: ToolLimiter,
        padding: u64,
        parallelism: usize,
    ) -> Self {
        Self {
            dir: dir.into(),
            merger,
            chrom_lengths,
            limiter,
            padding,
            parallelism: parallelism.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_paths(&self, key: &str, with_deviation: bool) -> (PathBuf, Option<PathBuf>) {
        let primary = self.dir.join(format!("{}.{}", key, MERGED_EXTENSION));
        let deviation = with_deviation
            .then(|| self.dir.join(format!("{}{}.{}", key, DEVIATION_SUFFIX, MERGED_EXTENSION)));
        (primary, deviation)
    }

    /// Merge one group's tracks over an already-padded window
    ///
    /// The computation runs in its own task: a caller dropping this future
    /// does not cancel a merge that has started.
    pub async fn merge_group(
        &self,
        condition: Condition,
        class: GenotypeClass,
        paths: Vec<PathBuf>,
        window: &GenomicWindow,
    ) -> EngineResult<MergedTrack> {
        let mut inputs = paths;
        inputs.sort();
        inputs.dedup();

        if inputs.is_empty() {
            return Err(EngineError::Consistency(format!(
                "no tracks to merge for {}/{}",
                condition, class
            )));
        }

        let key = cache_key(&inputs, window)?;
        let (output, deviation) = self.entry_paths(&key, inputs.len() > 1);

        // Cache hit: no permit taken
        if entry_ready(&output, deviation.as_deref()).await? {
            debug!("Merge cache hit for {}/{}: {}", condition, class, key);
            return Ok(handle(output, deviation, true));
        }

        let job = MergeJob {
            merger: Arc::clone(&self.merger),
            limiter: self.limiter.clone(),
            dir: self.dir.clone(),
            key,
            request: MergeRequest {
                inputs,
                window: window.clone(),
                output,
                deviation,
            },
        };

        tokio::spawn(job.run()).await?
    }

    /// Merge every (condition, genotype class) group of a peak's tracks
    ///
    /// Group failures are reported in place and never abort other groups.
    pub async fn merge_tracks(&self, tracks: &[TrackReference], feature: &Feature) -> PeakTracks {
        let mut groups: ByCondition<ByGenotype<Vec<PathBuf>>> = ByCondition::default();
        for track in tracks {
            groups
                .get_mut(track.condition)
                .get_mut(track.class)
                .push(track.path.clone());
        }

        let work: Vec<(Condition, GenotypeClass, Vec<PathBuf>)> = Condition::ALL
            .into_iter()
            .flat_map(|condition| {
                GenotypeClass::ALL
                    .into_iter()
                    .map(move |class| (condition, class))
            })
            .map(|(condition, class)| {
                let paths = std::mem::take(groups.get_mut(condition).get_mut(class));
                (condition, class, paths)
            })
            .filter(|(_, _, paths)| !paths.is_empty())
            .collect();

        let outcomes = stream::iter(work.into_iter().map(|(condition, class, paths)| async move {
            let result = self.merge_padded(condition, class, paths, feature).await;
            (condition, class, result)
        }))
        .buffer_unordered(self.parallelism)
        .collect::<Vec<_>>()
        .await;

        let mut merged = PeakTracks::default();
        for (condition, class, result) in outcomes {
            let slot = merged.get_mut(condition).get_mut(class);
            *slot = match result {
                Ok(track) => GroupMerge::Ready(track),
                Err(e) => {
                    warn!("Merge failed for {}/{} of {}: {}", condition, class, feature.id, e);
                    GroupMerge::Failed {
                        message: e.to_string(),
                    }
                }
            };
        }

        merged
    }

    async fn merge_padded(
        &self,
        condition: Condition,
        class: GenotypeClass,
        mut paths: Vec<PathBuf>,
        feature: &Feature,
    ) -> EngineResult<MergedTrack> {
        paths.sort();
        let chrom = normalize_chrom(&feature.chrom);
        let reference = paths.first().ok_or_else(|| {
            EngineError::Consistency(format!("no tracks to merge for {}/{}", condition, class))
        })?;

        let chrom_length = self.chrom_lengths.length_of(reference, &chrom).await?;
        let window = merge_window(feature, self.padding, chrom_length);

        self.merge_group(condition, class, paths, &window).await
    }
}

/// A cache miss being computed under a tool permit
struct MergeJob {
    merger: Arc<dyn TrackMerger>,
    limiter: ToolLimiter,
    dir: PathBuf,
    key: String,
    request: MergeRequest,
}

impl MergeJob {
    async fn run(self) -> EngineResult<MergedTrack> {
        let _permit = self.limiter.acquire().await?;
        let output = self.request.output.clone();
        let deviation = self.request.deviation.clone();

        // Another request may have finished the same entry while we waited
        if entry_ready(&output, deviation.as_deref()).await? {
            debug!("Merge {} completed while waiting for a slot", self.key);
            return Ok(handle(output, deviation, true));
        }

        let nonce = Uuid::new_v4().simple().to_string();
        let temp_output = self.dir.join(format!("{}.{}.{}", self.key, nonce, TEMP_EXTENSION));
        let temp_deviation = deviation
            .as_ref()
            .map(|_| self.dir.join(format!("{}{}.{}.{}", self.key, DEVIATION_SUFFIX, nonce, TEMP_EXTENSION)));

        let temp_request = MergeRequest {
            inputs: self.request.inputs.clone(),
            window: self.request.window.clone(),
            output: temp_output.clone(),
            deviation: temp_deviation.clone(),
        };

        info!(
            "Merging {} tracks over {} into {}",
            temp_request.inputs.len(),
            temp_request.window,
            self.key
        );

        let published = match self.merger.merge(&temp_request).await {
            Ok(()) => publish(&temp_output, &output, temp_deviation.as_deref(), deviation.as_deref()).await,
            Err(e) => Err(e),
        };

        if let Err(e) = published {
            discard(&temp_output).await;
            if let Some(temp) = &temp_deviation {
                discard(temp).await;
            }
            return Err(e);
        }

        Ok(handle(output, deviation, false))
    }
}

/// Rename temporaries into place, deviation first so a visible primary
/// always has its companion
async fn publish(
    temp_output: &Path,
    output: &Path,
    temp_deviation: Option<&Path>,
    deviation: Option<&Path>,
) -> EngineResult<()> {
    if let (Some(temp), Some(target)) = (temp_deviation, deviation) {
        tokio::fs::rename(temp, target)
            .await
            .map_err(|e| EngineError::io(target, e))?;
    }

    tokio::fs::rename(temp_output, output)
        .await
        .map_err(|e| EngineError::io(output, e))
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

async fn entry_ready(output: &Path, deviation: Option<&Path>) -> EngineResult<bool> {
    if !tokio::fs::try_exists(output)
        .await
        .map_err(|e| EngineError::io(output, e))?
    {
        return Ok(false);
    }

    match deviation {
        Some(dev) => tokio::fs::try_exists(dev)
            .await
            .map_err(|e| EngineError::io(dev, e)),
        None => Ok(true),
    }
}

fn handle(path: PathBuf, deviation: Option<PathBuf>, cached: bool) -> MergedTrack {
    let url = match path.file_name() {
        Some(name) => format!("{}/{}", URL_PREFIX, name.to_string_lossy()),
        None => URL_PREFIX.to_string(),
    };

    MergedTrack {
        path,
        url,
        deviation,
        cached,
    }
}
