// ==============================================================================
// config.rs - Engine Configuration
// ==============================================================================
// Description: Paths, tool binaries and concurrency limits loaded from environment
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::resolver::VariantFilter;

const DEFAULT_TOOL_PERMITS: usize = 2;
const DEFAULT_EXTRACT_PARALLELISM: usize = 8;
const DEFAULT_MERGE_PADDING: u64 = 100_000;
const DEFAULT_VALUES_TTL_DAYS: u64 = 180;
const DEFAULT_STALE_TEMP_HOURS: u64 = 24;
const SECS_PER_HOUR: u64 = 60 * 60;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// External tool programs (looked up on PATH unless absolute)
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub summary_bin: PathBuf,
    pub merge_bin: PathBuf,
    pub chrom_sizes_bin: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            summary_bin: PathBuf::from("bigWigSummary"),
            merge_bin: PathBuf::from("bigWigMergePlus"),
            chrom_sizes_bin: PathBuf::from("bigWigInfo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// SQLite variant store
    pub variant_db: PathBuf,

    /// CSV track metadata (donor,ethnicity,assay,condition,view,path)
    pub track_metadata: PathBuf,

    /// Merge-cache directory
    pub merged_tracks_dir: PathBuf,

    pub tools: ToolPaths,

    /// Process-wide limit on concurrent external tool invocations
    pub tool_permits: usize,

    /// Per-request fan-out bound for extraction and merges
    pub extract_parallelism: usize,

    /// Padding added on each side of a feature before merging
    pub merge_padding: u64,

    pub variant_filter: VariantFilter,

    /// Assays recorded as separate forward/reverse tracks
    pub strand_aware_assays: Vec<String>,

    /// Values cache; disabled when None
    pub redis_url: Option<String>,

    pub values_ttl: Duration,

    /// Merge temporaries older than this are treated as abandoned
    pub stale_temp_age: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            variant_db: PathBuf::from("/data/varwig/variants.db"),
            track_metadata: PathBuf::from("/data/varwig/tracks.csv"),
            merged_tracks_dir: PathBuf::from("/data/varwig/mergedTracks"),
            tools: ToolPaths::default(),
            tool_permits: DEFAULT_TOOL_PERMITS,
            extract_parallelism: DEFAULT_EXTRACT_PARALLELISM,
            merge_padding: DEFAULT_MERGE_PADDING,
            variant_filter: VariantFilter::Snv,
            strand_aware_assays: vec!["RNA-Seq".to_string()],
            redis_url: None,
            values_ttl: Duration::from_secs(DEFAULT_VALUES_TTL_DAYS * SECS_PER_DAY),
            stale_temp_age: Duration::from_secs(DEFAULT_STALE_TEMP_HOURS * SECS_PER_HOUR),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `VARWIG_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("VARWIG_VARIANT_DB") {
            config.variant_db = PathBuf::from(v);
        }
        if let Some(v) = lookup("VARWIG_TRACK_METADATA") {
            config.track_metadata = PathBuf::from(v);
        }
        if let Some(v) = lookup("VARWIG_MERGED_TRACKS_DIR") {
            config.merged_tracks_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("VARWIG_SUMMARY_BIN") {
            config.tools.summary_bin = PathBuf::from(v);
        }
        if let Some(v) = lookup("VARWIG_MERGE_BIN") {
            config.tools.merge_bin = PathBuf::from(v);
        }
        if let Some(v) = lookup("VARWIG_CHROM_SIZES_BIN") {
            config.tools.chrom_sizes_bin = PathBuf::from(v);
        }
        if let Some(v) = lookup("VARWIG_TOOL_PERMITS") {
            config.tool_permits = parse_number("VARWIG_TOOL_PERMITS", &v)?;
        }
        if let Some(v) = lookup("VARWIG_EXTRACT_PARALLELISM") {
            config.extract_parallelism = parse_number("VARWIG_EXTRACT_PARALLELISM", &v)?;
        }
        if let Some(v) = lookup("VARWIG_MERGE_PADDING") {
            config.merge_padding = parse_number("VARWIG_MERGE_PADDING", &v)?;
        }
        if let Some(v) = lookup("VARWIG_VARIANT_FILTER") {
            config.variant_filter = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "VARWIG_VARIANT_FILTER".to_string(),
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("VARWIG_STRAND_AWARE_ASSAYS") {
            config.strand_aware_assays = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("VARWIG_REDIS_URL") {
            if !v.trim().is_empty() {
                config.redis_url = Some(v);
            }
        }
        if let Some(v) = lookup("VARWIG_VALUES_TTL_DAYS") {
            config.values_ttl = parse_duration("VARWIG_VALUES_TTL_DAYS", &v, SECS_PER_DAY)?;
        }
        if let Some(v) = lookup("VARWIG_STALE_TEMP_HOURS") {
            config.stale_temp_age = parse_duration("VARWIG_STALE_TEMP_HOURS", &v, SECS_PER_HOUR)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool_permits == 0 {
            return Err(ConfigError::Zero("tool_permits"));
        }
        if self.extract_parallelism == 0 {
            return Err(ConfigError::Zero("extract_parallelism"));
        }
        Ok(())
    }

    pub fn is_strand_aware(&self, assay: &str) -> bool {
        self.strand_aware_assays
            .iter()
            .any(|a| a.eq_ignore_ascii_case(assay))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Whole units of `unit_secs` seconds, rejecting values that overflow
fn parse_duration(key: &str, value: &str, unit_secs: u64) -> Result<Duration, ConfigError> {
    let units: u64 = parse_number(key, value)?;
    units
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.tool_permits, 2);
        assert_eq!(config.merge_padding, 100_000);
        assert_eq!(config.variant_filter, VariantFilter::Snv);
        assert!(config.redis_url.is_none());
        assert_eq!(config.values_ttl, Duration::from_secs(180 * 86_400));
        assert_eq!(config.stale_temp_age, Duration::from_secs(24 * 3_600));
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("VARWIG_TOOL_PERMITS", "4"),
            ("VARWIG_STRAND_AWARE_ASSAYS", "RNA-Seq, PRO-Seq"),
            ("VARWIG_VARIANT_FILTER", "all"),
            ("VARWIG_REDIS_URL", "redis://cache:6379"),
        ]))
        .unwrap();

        assert_eq!(config.tool_permits, 4);
        assert!(config.is_strand_aware("rna-seq"));
        assert!(config.is_strand_aware("PRO-Seq"));
        assert!(!config.is_strand_aware("ATAC-Seq"));
        assert_eq!(config.variant_filter, VariantFilter::All);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
    }

    #[test]
    fn test_invalid_values() {
        let result = EngineConfig::from_lookup(lookup_from(&[("VARWIG_TOOL_PERMITS", "two")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = EngineConfig::from_lookup(lookup_from(&[("VARWIG_TOOL_PERMITS", "0")]));
        assert_eq!(result, Err(ConfigError::Zero("tool_permits")));
    }

    #[test]
    fn test_durations_reject_overflow() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("VARWIG_VALUES_TTL_DAYS", "7"),
            ("VARWIG_STALE_TEMP_HOURS", "2"),
        ]))
        .unwrap();
        assert_eq!(config.values_ttl, Duration::from_secs(7 * 86_400));
        assert_eq!(config.stale_temp_age, Duration::from_secs(7_200));

        let huge = u64::MAX.to_string();
        for key in ["VARWIG_VALUES_TTL_DAYS", "VARWIG_STALE_TEMP_HOURS"] {
            let result = EngineConfig::from_lookup(lookup_from(&[(key, huge.as_str())]));
            assert_eq!(
                result,
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: huge.clone(),
                })
            );
        }
    }
}
