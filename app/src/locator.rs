// ==============================================================================
// locator.rs - Track Locator
// ==============================================================================
// Description: Maps resolved sample genotypes to their raw signal tracks for an assay
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{GenotypeRecord, Peak, TrackReference};
use crate::stores::TrackMetadataStore;

/// Pure lookup over loaded track metadata
///
/// Every strand view is returned; picking the view matching the feature is
/// left to the extractor.
pub struct TrackLocator {
    metadata: Arc<dyn TrackMetadataStore>,
}

impl TrackLocator {
    pub fn new(metadata: Arc<dyn TrackMetadataStore>) -> Self {
        Self { metadata }
    }

    pub fn locate(
        &self,
        genotypes: &BTreeMap<String, GenotypeRecord>,
        peak: &Peak,
    ) -> Vec<TrackReference> {
        let mut located = Vec::new();
        let mut without_tracks = 0usize;

        for (sample_id, genotype) in genotypes {
            let Some(sample) = self.metadata.sample(sample_id) else {
                without_tracks += 1;
                continue;
            };

            let tracks = self.metadata.tracks_for(sample_id, &peak.assay);
            if tracks.is_empty() {
                without_tracks += 1;
                continue;
            }

            located.extend(tracks.into_iter().map(|track| TrackReference {
                donor: sample.donor.clone(),
                assay: track.assay,
                condition: track.condition,
                ancestry: sample.ancestry.clone(),
                class: genotype.class,
                view: track.view,
                path: track.path,
            }));
        }

        debug!(
            "Located {} {} tracks for peak {} ({} genotyped samples without tracks)",
            located.len(),
            peak.assay,
            peak.id,
            without_tracks
        );

        located
    }
}
