// ==============================================================================
// queue.rs - Redis Precompute Queue (Worker Side)
// ==============================================================================
// Description: Consumes precompute requests and publishes job progress
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use varwig_engine::Peak;

const QUEUE_KEY: &str = "varwig:precompute_queue";
const PROGRESS_PREFIX: &str = "varwig:progress";

/// Precompute request pushed by the web layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputePayload {
    pub job_id: Uuid,
    pub peak: Peak,
    /// Also warm the merge cache for this peak
    #[serde(default)]
    pub merge_tracks: bool,
}

/// Progress message published on `varwig:progress:<job_id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: Uuid,
    pub progress_pct: f32,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(job_id: Uuid, progress_pct: f32, message: impl Into<String>) -> Self {
        Self {
            job_id,
            progress_pct,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

pub fn progress_channel(job_id: Uuid) -> String {
    format!("{}:{}", PROGRESS_PREFIX, job_id)
}

/// Destination for job progress
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, update: &ProgressUpdate) -> Result<()>;
}

/// Source of precompute requests
///
/// Callers must await `dequeue` to completion: an abandoned blocking pop may
/// still consume a request server-side.
#[async_trait]
pub trait JobSource: Send {
    async fn dequeue(&mut self) -> Result<Option<PrecomputePayload>>;
}

/// Job queue manager
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
}

impl JobQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl JobSource for JobQueue {
    /// Dequeue a request (blocking pop with timeout)
    async fn dequeue(&mut self) -> Result<Option<PrecomputePayload>> {
        // BRPOP with 1 second timeout
        let result: Option<(String, String)> = self
            .conn
            .brpop(QUEUE_KEY, 1.0)
            .await
            .context("Failed to pop from queue")?;

        match result {
            Some((_, payload_json)) => {
                let payload: PrecomputePayload = serde_json::from_str(&payload_json)
                    .context("Failed to deserialize precompute payload")?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProgressSink for JobQueue {
    async fn publish(&self, update: &ProgressUpdate) -> Result<()> {
        let message = serde_json::to_string(update).context("Failed to serialize progress update")?;
        let mut conn = self.conn.clone();

        conn.publish::<_, _, ()>(progress_channel(update.job_id), message)
            .await
            .context("Failed to publish progress update")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "job_id": "7f8d2c3e-1b4a-4c5d-9e6f-0a1b2c3d4e5f",
        "peak": {
            "id": 12,
            "snp": {"id": "rs4950928", "chrom": "1", "position": 203186754},
            "feature": {"id": "CHI3L1", "chrom": "1", "start": 203178931, "end": 203186754, "strand": "-"},
            "assay": "RNA-Seq",
            "valueNI": 0.81,
            "valueFlu": 0.64
        }
    }"#;

    #[test]
    fn test_payload_defaults_merge_off() {
        let payload: PrecomputePayload = serde_json::from_str(PAYLOAD).unwrap();
        assert_eq!(payload.peak.id, 12);
        assert_eq!(payload.peak.snp.position, 203_186_754);
        assert!(payload.peak.feature.gene.is_none());
        assert!(!payload.merge_tracks);
    }

    #[test]
    fn test_progress_message_shape() {
        let job_id = Uuid::new_v4();
        let update = ProgressUpdate::new(job_id, 50.0, "Values cached");

        let json: serde_json::Value = serde_json::to_value(&update).unwrap();
        assert_eq!(json["job_id"], job_id.to_string());
        assert_eq!(json["progress_pct"], 50.0);
        assert_eq!(json["message"], "Values cached");
        assert!(json["timestamp"].is_string());

        assert_eq!(progress_channel(job_id), format!("varwig:progress:{}", job_id));
    }
}
