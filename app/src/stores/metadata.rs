// ==============================================================================
// stores/metadata.rs - CSV Track Metadata Store
// ==============================================================================
// Description: Loads per-sample signal track listings from a metadata CSV
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Format (header required):
//   donor,ethnicity,assay,condition,view,path
//   EU01,EU,RNA-Seq,NI,signal_forward,/data/tracks/EU01_NI_RNA.fwd.bw
// ==============================================================================

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::TrackMetadataStore;
use crate::error::EngineResult;
use crate::models::{Condition, Sample, SampleTrack, TrackView};

#[derive(Debug, Deserialize)]
struct MetadataRow {
    donor: String,
    ethnicity: String,
    assay: String,
    condition: String,
    #[serde(default)]
    view: String,
    path: PathBuf,
}

/// Track metadata held in memory after loading
#[derive(Debug, Default)]
pub struct CsvTrackMetadata {
    samples: HashMap<String, Sample>,
}

impl CsvTrackMetadata {
    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let reader = csv::Reader::from_path(path.as_ref())?;
        let store = Self::from_csv_reader(reader)?;

        info!(
            "Loaded track metadata for {} samples from {:?}",
            store.samples.len(),
            path.as_ref()
        );
        Ok(store)
    }

    pub fn from_reader<R: Read>(reader: R) -> EngineResult<Self> {
        Self::from_csv_reader(csv::Reader::from_reader(reader))
    }

    fn from_csv_reader<R: Read>(mut reader: csv::Reader<R>) -> EngineResult<Self> {
        let mut samples: HashMap<String, Sample> = HashMap::new();
        let mut skipped = 0usize;

        for result in reader.deserialize::<MetadataRow>() {
            let row = result?;

            let condition = match row.condition.parse::<Condition>() {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping track {:?}: {}", row.path, e);
                    skipped += 1;
                    continue;
                }
            };
            let view = match row.view.parse::<TrackView>() {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping track {:?}: {}", row.path, e);
                    skipped += 1;
                    continue;
                }
            };

            let sample = samples.entry(row.donor.clone()).or_insert_with(|| Sample {
                donor: row.donor.clone(),
                ancestry: row.ethnicity.clone(),
                tracks: Vec::new(),
            });

            sample.tracks.push(SampleTrack {
                assay: row.assay,
                condition,
                view,
                path: row.path,
            });
        }

        if skipped > 0 {
            warn!("Skipped {} track metadata rows", skipped);
        }

        Ok(Self { samples })
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl TrackMetadataStore for CsvTrackMetadata {
    fn sample(&self, sample_id: &str) -> Option<&Sample> {
        self.samples.get(sample_id)
    }
}
