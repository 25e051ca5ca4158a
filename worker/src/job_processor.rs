// ==============================================================================
// job_processor.rs - Precompute Job Logic
// ==============================================================================
// Description: Warms the values cache and merge cache for one peak
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use varwig_engine::{EngineContext, GroupMerge, GroupSummary, PeakStatistics, PeakTracks};

use crate::queue::{PrecomputePayload, ProgressSink, ProgressUpdate};

/// What a finished job produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// (condition, genotype) groups with at least one value
    pub populated_groups: usize,
    /// Groups with at least one track that could not be summarized
    pub partial_groups: usize,
    /// Groups merged (None when merging was not requested)
    pub merged_groups: Option<usize>,
    pub failed_merges: usize,
}

/// Runs one precompute request against the engine
pub struct JobProcessor<'a> {
    engine: &'a EngineContext,
    progress: &'a dyn ProgressSink,
}

impl<'a> JobProcessor<'a> {
    pub fn new(engine: &'a EngineContext, progress: &'a dyn ProgressSink) -> Self {
        Self { engine, progress }
    }

    pub async fn process(&self, payload: &PrecomputePayload) -> Result<JobOutcome> {
        let job_id = payload.job_id;
        let peak = &payload.peak;

        self.publish_progress(job_id, 0.0, &format!("Starting precompute for peak {}", peak.id))
            .await;

        let result = self.run_steps(payload).await;

        match &result {
            Ok(outcome) => {
                info!("Job {} complete: {:?}", job_id, outcome);
                self.publish_progress(job_id, 100.0, "Precompute complete").await;
            }
            Err(e) => {
                self.publish_progress(job_id, 0.0, &format!("Failed: {:#}", e)).await;
            }
        }

        result
    }

    async fn run_steps(&self, payload: &PrecomputePayload) -> Result<JobOutcome> {
        let job_id = payload.job_id;
        let peak = &payload.peak;

        let stats = self
            .engine
            .values(peak)
            .await
            .with_context(|| format!("Failed to compute values for peak {}", peak.id))?;

        let populated_groups = count_groups(&stats, |g| !g.is_empty());
        let partial_groups = count_groups(&stats, |g| g.is_partial());
        info!("Job {}: values for peak {} ({} populated groups)", job_id, peak.id, populated_groups);
        if partial_groups > 0 {
            warn!("Job {}: {} group(s) of peak {} are partial", job_id, partial_groups, peak.id);
        }

        if !payload.merge_tracks {
            return Ok(JobOutcome {
                populated_groups,
                partial_groups,
                merged_groups: None,
                failed_merges: 0,
            });
        }

        self.publish_progress(job_id, 50.0, "Values cached, merging tracks").await;

        let tracks = self
            .engine
            .tracks(peak)
            .await
            .with_context(|| format!("Failed to merge tracks for peak {}", peak.id))?;

        let (merged, failed) = count_merges(&tracks);
        if failed > 0 {
            warn!("Job {}: {} group merge(s) failed for peak {}", job_id, failed, peak.id);
        }

        Ok(JobOutcome {
            populated_groups,
            partial_groups,
            merged_groups: Some(merged),
            failed_merges: failed,
        })
    }

    /// Progress is best-effort; a lost update never fails the job
    async fn publish_progress(&self, job_id: Uuid, progress_pct: f32, message: &str) {
        let update = ProgressUpdate::new(job_id, progress_pct, message);
        if let Err(e) = self.progress.publish(&update).await {
            warn!("Job {}: failed to publish progress: {:#}", job_id, e);
        }
    }
}

fn count_groups(stats: &PeakStatistics, matches: impl Fn(&GroupSummary) -> bool) -> usize {
    stats
        .iter()
        .flat_map(|(_, by_class)| by_class.iter().map(|(_, group)| matches(group)))
        .filter(|matched| *matched)
        .count()
}

fn count_merges(tracks: &PeakTracks) -> (usize, usize) {
    let mut merged = 0;
    let mut failed = 0;

    for (_, by_class) in tracks.iter() {
        for (_, outcome) in by_class.iter() {
            match outcome {
                GroupMerge::Ready(_) => merged += 1,
                GroupMerge::Failed { .. } => failed += 1,
                GroupMerge::Empty => {}
            }
        }
    }

    (merged, failed)
}
