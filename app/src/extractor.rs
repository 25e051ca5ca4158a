// ==============================================================================
// extractor.rs - Signal Extractor
// ==============================================================================
// Description: Computes one scalar signal per located track over a feature interval
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Notes:
//   - Strand-aware assays keep only the view matching the feature strand
//     ('+' → signal_forward, '-' → signal_reverse); an unstranded feature
//     keeps only unstranded views, never both strand views of one donor
//   - "No data" is dropped, never coerced to zero
//   - One track failing never aborts the others
// ==============================================================================

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    normalize_chrom, ExtractedValue, Feature, GenomicWindow, TrackReference, TrackView,
};
use crate::tools::{SignalSummarizer, ToolLimiter};

/// Whether a track should contribute to a feature's signal
pub fn selects_track(track: &TrackReference, feature: &Feature, strand_aware: bool) -> bool {
    if !strand_aware {
        return true;
    }
    match feature.strand {
        Some(strand) => track.view == strand.view(),
        None => track.view == TrackView::Signal,
    }
}

/// Track whose summary could not be computed
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFailure {
    pub track: TrackReference,
    pub message: String,
}

/// Outcome of extracting every located track
#[derive(Debug, Default)]
pub struct Extraction {
    pub values: Vec<ExtractedValue>,
    /// Tracks dropped by strand selection
    pub skipped_strand: usize,
    /// Tracks with no coverage in the interval
    pub no_data: usize,
    pub failures: Vec<TrackFailure>,
}

pub struct SignalExtractor {
    summarizer: Arc<dyn SignalSummarizer>,
    limiter: ToolLimiter,
    parallelism: usize,
}

impl SignalExtractor {
    pub fn new(summarizer: Arc<dyn SignalSummarizer>, limiter: ToolLimiter, parallelism: usize) -> Self {
        Self {
            summarizer,
            limiter,
            parallelism: parallelism.max(1),
        }
    }

    /// Extract values concurrently; result order is not significant
    ///
    /// Each summary runs in its own task holding a tool permit, so a request
    /// dropped mid-way lets started summaries finish and release their slot.
    pub async fn extract(
        &self,
        tracks: Vec<TrackReference>,
        feature: &Feature,
        strand_aware: bool,
    ) -> Extraction {
        let total = tracks.len();
        let (selected, skipped): (Vec<_>, Vec<_>) = tracks
            .into_iter()
            .partition(|t| selects_track(t, feature, strand_aware));

        let window = GenomicWindow::new(normalize_chrom(&feature.chrom), feature.start, feature.end);
        debug!(
            "Extracting {} of {} tracks over {} ({} skipped by strand)",
            selected.len(),
            total,
            window,
            skipped.len()
        );

        let outcomes = stream::iter(selected.into_iter().map(|track| {
            let summarizer = Arc::clone(&self.summarizer);
            let limiter = self.limiter.clone();
            let window = window.clone();

            async move {
                let reference = track.clone();
                let task = tokio::spawn(async move {
                    match limiter.acquire().await {
                        Ok(_permit) => summarizer.summarize(&track.path, &window).await,
                        Err(e) => Err(e),
                    }
                });

                let result: EngineResult<Option<f64>> = match task.await {
                    Ok(result) => result,
                    Err(e) => Err(EngineError::Task(e)),
                };
                (reference, result)
            }
        }))
        .buffer_unordered(self.parallelism)
        .collect::<Vec<_>>()
        .await;

        let mut extraction = Extraction {
            skipped_strand: skipped.len(),
            ..Extraction::default()
        };

        for outcome in outcomes {
            match outcome {
                (track, Ok(Some(value))) => {
                    extraction.values.push(ExtractedValue { track, value });
                }
                (track, Ok(None)) => {
                    debug!("No data for {:?}", track.path);
                    extraction.no_data += 1;
                }
                (track, Err(e)) => {
                    warn!("Extraction failed for {:?}: {}", track.path, e);
                    extraction.failures.push(TrackFailure {
                        track,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Extracted {} values ({} no data, {} failed, {} skipped by strand)",
            extraction.values.len(),
            extraction.no_data,
            extraction.failures.len(),
            extraction.skipped_strand
        );

        extraction
    }
}
