// ==============================================================================
// error.rs - Engine Error Taxonomy
// ==============================================================================
// Description: Error types shared by the resolver, locator, extractor and merge cache
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the aggregation pipeline
///
/// Recoverable kinds (`NotFound`, `MalformedData`, `Consistency`) are turned
/// into empty or partial results by the request layer. `ExternalTool` is scoped
/// to a single track or group, `Io` is fatal to the operation that hit it.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No variant found at {chrom}:{position}")]
    NotFound { chrom: String, position: u64 },

    #[error("Malformed data for sample '{sample}': {reason}")]
    MalformedData { sample: String, reason: String },

    #[error("External tool '{program}' failed: {message}")]
    ExternalTool { program: String, message: String },

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Variant store error: {0}")]
    VariantStore(#[from] rusqlite::Error),

    #[error("Track metadata error: {0}")]
    Metadata(#[from] csv::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn tool(program: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::ExternalTool {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Whether the request layer should degrade to an empty result
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::MalformedData { .. }
                | EngineError::Consistency(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
