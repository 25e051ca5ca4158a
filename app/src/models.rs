// ==============================================================================
// models.rs - Variant, Feature, Sample and Track Data Models
// ==============================================================================
// Description: Data structures shared by every stage of the aggregation pipeline
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Coordinates:
//   - Variant positions are 1-based (as published in QTL tables)
//   - Feature intervals and genomic windows are 0-based half-open
//   - The only conversion happens in the variant store (position - 1 = start)
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Strand of a genomic feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

impl Strand {
    /// Track view holding signal for this strand
    pub fn view(&self) -> TrackView {
        match self {
            Strand::Forward => TrackView::SignalForward,
            Strand::Reverse => TrackView::SignalReverse,
        }
    }
}

/// Variant (SNP) at a 1-based position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Natural ID (rsID) or accession
    pub id: String,

    /// Chromosome, with or without the "chr" prefix
    pub chrom: String,

    /// 1-based position
    pub position: u64,
}

/// Genomic region of interest (gene body, peak region)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub chrom: String,
    /// 0-based, inclusive
    pub start: u64,
    /// 0-based, exclusive
    pub end: u64,
    #[serde(default)]
    pub strand: Option<Strand>,
    #[serde(default)]
    pub gene: Option<String>,
}

/// A (variant, feature, assay) association selected by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub id: i64,
    pub snp: Variant,
    pub feature: Feature,
    pub assay: String,
    #[serde(rename = "valueNI")]
    pub value_ni: f64,
    #[serde(rename = "valueFlu")]
    pub value_flu: f64,
}

/// Experimental treatment group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "NI")]
    NonInfected,
    #[serde(rename = "Flu")]
    Flu,
}

impl Condition {
    pub const ALL: [Condition; 2] = [Condition::NonInfected, Condition::Flu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::NonInfected => "NI",
            Condition::Flu => "Flu",
        }
    }

    /// Title used on plot panels
    pub fn title(&self) -> &'static str {
        match self {
            Condition::NonInfected => "Non-infected",
            Condition::Flu => "Flu",
        }
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NI" | "ni" => Ok(Condition::NonInfected),
            "Flu" | "flu" | "FLU" => Ok(Condition::Flu),
            other => Err(format!("Unknown condition: '{}'", other)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of alternate-allele copies carried at a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GenotypeClass {
    /// Homozygous reference
    #[serde(rename = "REF")]
    Ref,
    /// Heterozygous
    #[serde(rename = "HET")]
    Het,
    /// Homozygous alternate
    #[serde(rename = "HOM")]
    Hom,
}

impl GenotypeClass {
    pub const ALL: [GenotypeClass; 3] = [GenotypeClass::Ref, GenotypeClass::Het, GenotypeClass::Hom];

    /// Classify from an alternate-allele count (0, 1 or 2)
    pub fn from_alt_count(count: usize) -> Option<Self> {
        match count {
            0 => Some(GenotypeClass::Ref),
            1 => Some(GenotypeClass::Het),
            2 => Some(GenotypeClass::Hom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenotypeClass::Ref => "REF",
            GenotypeClass::Het => "HET",
            GenotypeClass::Hom => "HOM",
        }
    }

    /// Axis label used on plots
    pub fn label(&self) -> &'static str {
        match self {
            GenotypeClass::Ref => "Hom Ref",
            GenotypeClass::Het => "Het",
            GenotypeClass::Hom => "Hom Alt",
        }
    }
}

impl fmt::Display for GenotypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slot per genotype class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByGenotype<T> {
    #[serde(rename = "REF")]
    pub hom_ref: T,
    #[serde(rename = "HET")]
    pub het: T,
    #[serde(rename = "HOM")]
    pub hom_alt: T,
}

impl<T> ByGenotype<T> {
    pub fn get(&self, class: GenotypeClass) -> &T {
        match class {
            GenotypeClass::Ref => &self.hom_ref,
            GenotypeClass::Het => &self.het,
            GenotypeClass::Hom => &self.hom_alt,
        }
    }

    pub fn get_mut(&mut self, class: GenotypeClass) -> &mut T {
        match class {
            GenotypeClass::Ref => &mut self.hom_ref,
            GenotypeClass::Het => &mut self.het,
            GenotypeClass::Hom => &mut self.hom_alt,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(GenotypeClass, T) -> U) -> ByGenotype<U> {
        ByGenotype {
            hom_ref: f(GenotypeClass::Ref, self.hom_ref),
            het: f(GenotypeClass::Het, self.het),
            hom_alt: f(GenotypeClass::Hom, self.hom_alt),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (GenotypeClass, &T)> {
        GenotypeClass::ALL.into_iter().map(move |class| (class, self.get(class)))
    }
}

/// One slot per condition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByCondition<T> {
    #[serde(rename = "NI")]
    pub non_infected: T,
    #[serde(rename = "Flu")]
    pub flu: T,
}

impl<T> ByCondition<T> {
    pub fn get(&self, condition: Condition) -> &T {
        match condition {
            Condition::NonInfected => &self.non_infected,
            Condition::Flu => &self.flu,
        }
    }

    pub fn get_mut(&mut self, condition: Condition) -> &mut T {
        match condition {
            Condition::NonInfected => &mut self.non_infected,
            Condition::Flu => &mut self.flu,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Condition, T) -> U) -> ByCondition<U> {
        ByCondition {
            non_infected: f(Condition::NonInfected, self.non_infected),
            flu: f(Condition::Flu, self.flu),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Condition, &T)> {
        Condition::ALL.into_iter().map(move |condition| (condition, self.get(condition)))
    }
}

/// Resolved genotype of one sample at one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenotypeRecord {
    pub sample_id: String,

    /// Raw call as stored (e.g., "0|1", "A/G")
    pub call: String,

    pub class: GenotypeClass,
}

/// Which strand a track's signal was recorded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackView {
    SignalForward,
    SignalReverse,
    /// Unstranded assays
    Signal,
}

impl FromStr for TrackView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "signal_forward" => Ok(TrackView::SignalForward),
            "signal_reverse" => Ok(TrackView::SignalReverse),
            "signal" | "" => Ok(TrackView::Signal),
            other => Err(format!("Unknown track view: '{}'", other)),
        }
    }
}

/// Sample with its per-assay tracks
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub donor: String,
    pub ancestry: String,
    pub tracks: Vec<SampleTrack>,
}

/// Raw track file as listed in the metadata store, before genotype annotation
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTrack {
    pub assay: String,
    pub condition: Condition,
    pub view: TrackView,
    pub path: PathBuf,
}

/// Per-sample raw signal track annotated with genotype (read-only)
#[derive(Debug, Clone, PartialEq)]
pub struct TrackReference {
    pub donor: String,
    pub assay: String,
    pub condition: Condition,
    pub ancestry: String,
    pub class: GenotypeClass,
    pub view: TrackView,
    pub path: PathBuf,
}

/// Scalar signal extracted from one track
///
/// Deliberately not `Serialize`: only group statistics leave the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedValue {
    pub track: TrackReference,
    pub value: f64,
}

/// 0-based half-open window on one chromosome
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomicWindow {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl GenomicWindow {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for GenomicWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

/// Normalise a chromosome name to the "chr" prefix used by track files
pub fn normalize_chrom(chrom: &str) -> String {
    if chrom.starts_with("chr") {
        chrom.to_string()
    } else {
        format!("chr{}", chrom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strand_to_view() {
        assert_eq!(Strand::Forward.view(), TrackView::SignalForward);
        assert_eq!(Strand::Reverse.view(), TrackView::SignalReverse);
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!("NI".parse::<Condition>().unwrap(), Condition::NonInfected);
        assert_eq!("Flu".parse::<Condition>().unwrap(), Condition::Flu);
        assert!("IAV".parse::<Condition>().is_err());
    }

    #[test]
    fn test_genotype_class_from_count() {
        assert_eq!(GenotypeClass::from_alt_count(0), Some(GenotypeClass::Ref));
        assert_eq!(GenotypeClass::from_alt_count(1), Some(GenotypeClass::Het));
        assert_eq!(GenotypeClass::from_alt_count(2), Some(GenotypeClass::Hom));
        assert_eq!(GenotypeClass::from_alt_count(3), None);
    }

    #[test]
    fn test_peak_json_shape() {
        let json = r#"{
            "id": 42,
            "snp": {"id": "rs123", "chrom": "1", "position": 1000},
            "feature": {"id": "1_900_1100_+", "chrom": "chr1", "start": 900, "end": 1100, "strand": "+"},
            "assay": "RNA-Seq",
            "valueNI": 0.001,
            "valueFlu": 0.2
        }"#;

        let peak: Peak = serde_json::from_str(json).unwrap();
        assert_eq!(peak.feature.strand, Some(Strand::Forward));
        assert_eq!(peak.feature.gene, None);
        assert_eq!(peak.value_ni, 0.001);
    }

    #[test]
    fn test_bucket_serialization_keys() {
        let buckets = ByCondition {
            non_infected: ByGenotype { hom_ref: 1, het: 2, hom_alt: 3 },
            flu: ByGenotype::default(),
        };
        let json = serde_json::to_value(&buckets).unwrap();
        assert_eq!(json["NI"]["REF"], 1);
        assert_eq!(json["NI"]["HOM"], 3);
        assert_eq!(json["Flu"]["HET"], 0);
    }

    #[test]
    fn test_normalize_chrom() {
        assert_eq!(normalize_chrom("1"), "chr1");
        assert_eq!(normalize_chrom("chrX"), "chrX");
    }
}
