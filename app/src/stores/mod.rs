// ==============================================================================
// stores/mod.rs - Variant and Track Metadata Stores
// ==============================================================================
// Description: Collaborator interfaces for genotype calls and per-sample track files
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

pub mod metadata;
pub mod variants;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::models::{Sample, SampleTrack};

pub use metadata::CsvTrackMetadata;
pub use variants::SqliteVariantStore;

/// Raw genotype call of one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantCall {
    pub sample_id: String,
    pub call: String,
}

/// Variant row overlapping a queried position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    pub chrom: String,
    /// 0-based start
    pub start: u64,
    pub end: u64,
    pub ref_allele: String,
    pub alt_alleles: Vec<String>,
    pub calls: Vec<VariantCall>,
}

/// Indexed store of cohort genotype calls
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Records overlapping a 1-based position (empty when none)
    async fn lookup(&self, chrom: &str, position: u64) -> EngineResult<Vec<VariantRecord>>;
}

/// Per-sample track files, already loaded in memory
pub trait TrackMetadataStore: Send + Sync {
    fn sample(&self, sample_id: &str) -> Option<&Sample>;

    fn tracks_for(&self, sample_id: &str, assay: &str) -> Vec<SampleTrack> {
        self.sample(sample_id)
            .map(|sample| {
                sample
                    .tracks
                    .iter()
                    .filter(|t| t.assay.eq_ignore_ascii_case(assay))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
