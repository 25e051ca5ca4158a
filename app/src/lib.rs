// ==============================================================================
// lib.rs - Varwig Engine Library
// ==============================================================================
// Description: Genotype-stratified signal track aggregation engine
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

pub mod aggregate;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod locator;
pub mod merge_cache;
pub mod models;
pub mod plot;
pub mod resolver;
pub mod stores;
pub mod tools;
pub mod values_cache;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{GroupSummary, PeakStatistics, Stats};
pub use config::EngineConfig;
pub use context::{Collaborators, EngineContext};
pub use error::{EngineError, EngineResult};
pub use merge_cache::{GroupMerge, MergedTrack, PeakTracks};
pub use models::Peak;
