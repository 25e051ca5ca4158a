// ==============================================================================
// values_cache.rs - Per-Peak Statistics Cache
// ==============================================================================
// Description: Memoizes aggregated peak statistics in Redis (or memory)
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Only aggregated statistics are cached; extracted per-sample values never
// reach this layer. Genomic data is immutable once ingested, so entries use
// a long expiry (default 180 days).
// ==============================================================================

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::aggregate::PeakStatistics;
use crate::error::{EngineError, EngineResult};

const KEY_PREFIX: &str = "varwig:values";

pub fn values_key(peak_id: i64) -> String {
    format!("{}:{}", KEY_PREFIX, peak_id)
}

#[async_trait]
pub trait ValuesCache: Send + Sync {
    async fn get(&self, peak_id: i64) -> EngineResult<Option<PeakStatistics>>;

    async fn put(&self, peak_id: i64, stats: &PeakStatistics) -> EngineResult<()>;
}

/// Redis-backed cache (`SET key json EX ttl`)
pub struct RedisValuesCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisValuesCache {
    pub async fn connect(url: &str, ttl: Duration) -> EngineResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("Values cache connected (ttl {} days)", ttl.as_secs() / 86_400);
        Ok(Self { conn, ttl })
    }

    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }
}

#[async_trait]
impl ValuesCache for RedisValuesCache {
    async fn get(&self, peak_id: i64) -> EngineResult<Option<PeakStatistics>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(values_key(peak_id)).await?;

        match cached {
            Some(json) => {
                debug!("Values cache hit for peak {}", peak_id);
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, peak_id: i64, stats: &PeakStatistics) -> EngineResult<()> {
        let json = serde_json::to_string(stats)?;
        let mut conn = self.conn.clone();

        conn.set_ex::<_, _, ()>(values_key(peak_id), json, self.ttl.as_secs())
            .await
            .map_err(EngineError::from)
    }
}

/// Process-local cache without expiry, for the CLI and tests
#[derive(Default)]
pub struct MemoryValuesCache {
    entries: Mutex<HashMap<i64, PeakStatistics>>,
}

impl MemoryValuesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ValuesCache for MemoryValuesCache {
    async fn get(&self, peak_id: i64) -> EngineResult<Option<PeakStatistics>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Consistency("values cache lock poisoned".to_string()))?;
        Ok(entries.get(&peak_id).cloned())
    }

    async fn put(&self, peak_id: i64, stats: &PeakStatistics) -> EngineResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Consistency("values cache lock poisoned".to_string()))?;
        entries.insert(peak_id, stats.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;

    #[test]
    fn test_values_key() {
        assert_eq!(values_key(1234), "varwig:values:1234");
    }

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryValuesCache::new();
        assert!(cache.get(7).await.unwrap().is_none());

        let stats = aggregate(&[]);
        cache.put(7, &stats).await.unwrap();

        assert_eq!(cache.get(7).await.unwrap(), Some(stats));
        assert!(cache.get(8).await.unwrap().is_none());
        assert_eq!(cache.len(), 1);
    }
}
