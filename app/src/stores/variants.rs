// ==============================================================================
// stores/variants.rs - SQLite Variant Store
// ==============================================================================
// Description: Reads cohort genotype calls from a gemini-style SQLite database
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Schema:
//   variants(chrom TEXT, start INTEGER, end INTEGER, ref TEXT, alt TEXT,
//            sample_genotypes TEXT)  -- JSON object {"sampleID": "0|1", ...}
//   start/end are 0-based half-open; alt is comma-separated
// ==============================================================================

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::{VariantCall, VariantRecord, VariantStore};
use crate::error::{EngineError, EngineResult};
use crate::models::normalize_chrom;

/// Variant store backed by a read-only SQLite connection
pub struct SqliteVariantStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVariantStore {
    /// Open variant database (read-only)
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Check the variants table is present and readable
    pub fn validate(&self) -> EngineResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| EngineError::Consistency("variant store lock poisoned".to_string()))?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM variants", [], |row| row.get(0))?;

        info!("Variant store validated: {} variants", count);
        Ok(count)
    }

    fn query(conn: &Connection, chrom: &str, start: u64, end: u64) -> rusqlite::Result<Vec<VariantRecord>> {
        let mut stmt = conn.prepare_cached(
            "SELECT chrom, start, end, ref, alt, sample_genotypes
             FROM variants
             WHERE chrom = ?1 AND start >= ?2 AND end <= ?3
             ORDER BY start",
        )?;

        let rows = stmt.query_map(params![chrom, start as i64, end as i64], |row| {
            let genotypes_json: String = row.get(5)?;
            let sample_map: BTreeMap<String, String> = serde_json::from_str(&genotypes_json)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?;

            let alt: String = row.get(4)?;

            Ok(VariantRecord {
                chrom: row.get(0)?,
                start: row.get::<_, i64>(1)? as u64,
                end: row.get::<_, i64>(2)? as u64,
                ref_allele: row.get(3)?,
                alt_alleles: alt.split(',').map(|a| a.trim().to_string()).collect(),
                calls: sample_map
                    .into_iter()
                    .map(|(sample_id, call)| VariantCall { sample_id, call })
                    .collect(),
            })
        })?;

        rows.collect()
    }
}

#[async_trait]
impl VariantStore for SqliteVariantStore {
    async fn lookup(&self, chrom: &str, position: u64) -> EngineResult<Vec<VariantRecord>> {
        let chrom = normalize_chrom(chrom);
        // 1-based position -> 0-based half-open [position - 1, position)
        let Some(start) = position.checked_sub(1) else {
            return Ok(Vec::new());
        };
        let end = position;

        let conn = Arc::clone(&self.conn);
        let query_chrom = chrom.clone();
        let records = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| EngineError::Consistency("variant store lock poisoned".to_string()))?;
            Self::query(&conn, &query_chrom, start, end).map_err(EngineError::from)
        })
        .await??;

        debug!("Variant store: {} record(s) at {}:{}", records.len(), chrom, position);
        Ok(records)
    }
}

#[cfg(test)]
pub(crate) fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE variants (
            chrom TEXT NOT NULL,
            start INTEGER NOT NULL,
            end INTEGER NOT NULL,
            ref TEXT NOT NULL,
            alt TEXT NOT NULL,
            sample_genotypes TEXT NOT NULL
        );
        CREATE INDEX idx_variants_locus ON variants (chrom, start);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seeded_store() -> (tempfile::TempDir, SqliteVariantStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("variants.db");
        {
            let conn = Connection::open(&path).unwrap();
            create_schema(&conn).unwrap();
            conn.execute(
                "INSERT INTO variants VALUES ('chr1', 999, 1000, 'A', 'G', ?1)",
                params![r#"{"D1": "A/A", "D2": "A/G", "D3": "G|G"}"#],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO variants VALUES ('chr1', 4999, 5000, 'C', 'T,A', ?1)",
                params![r#"{"D1": "0/2"}"#],
            )
            .unwrap();
        }
        let store = SqliteVariantStore::open(&path).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_lookup_converts_one_based_position() {
        let (_dir, store) = seeded_store();

        let records = store.lookup("1", 1000).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].start, 999);
        assert_eq!(records[0].calls.len(), 3);
        assert_eq!(records[0].calls[1].sample_id, "D2");
        assert_eq!(records[0].calls[1].call, "A/G");

        // Off-by-one neighbours do not match
        assert!(store.lookup("chr1", 999).await.unwrap().is_empty());
        assert!(store.lookup("chr1", 1001).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_splits_alternate_alleles() {
        let (_dir, store) = seeded_store();

        let records = store.lookup("chr1", 5000).await.unwrap();
        assert_eq!(records[0].alt_alleles, vec!["T".to_string(), "A".to_string()]);
    }

    #[tokio::test]
    async fn test_position_zero_is_empty() {
        let (_dir, store) = seeded_store();
        assert!(store.lookup("chr1", 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_validate_counts_rows() {
        let (_dir, store) = seeded_store();
        assert_eq!(store.validate().unwrap(), 2);
    }
}
