// ==============================================================================
// resolver.rs - Genotype Resolver
// ==============================================================================
// Description: Classifies every cohort sample as REF/HET/HOM at a variant position
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Algorithm:
//   Given a diploid call and the REF allele of the site:
//   - Split on '|' or '/'; anything but exactly two tokens is malformed
//   - A token is reference when it is "0" or equals REF, alternate otherwise
//   - 0 alternate tokens → REF, 1 → HET, 2 → HOM
//   - Missing tokens ("." or empty) are malformed; the sample is excluded
// ==============================================================================

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{GenotypeClass, GenotypeRecord};
use crate::stores::{VariantRecord, VariantStore};

/// Errors for a single genotype call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenotypeCallError {
    #[error("Invalid genotype call: '{0}' (expected exactly 2 alleles)")]
    InvalidFormat(String),

    #[error("Missing allele in genotype call: '{0}'")]
    MissingAllele(String),
}

/// Site-level predicate applied before classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantFilter {
    /// Single-nucleotide variants only
    Snv,
    /// No filtering
    All,
}

impl VariantFilter {
    pub fn accepts(&self, record: &VariantRecord) -> bool {
        match self {
            VariantFilter::All => true,
            VariantFilter::Snv => {
                record.ref_allele.len() == 1
                    && !record.alt_alleles.is_empty()
                    && record.alt_alleles.iter().all(|a| a.len() == 1)
            }
        }
    }
}

impl FromStr for VariantFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "snv" | "snp" => Ok(VariantFilter::Snv),
            "all" | "none" => Ok(VariantFilter::All),
            other => Err(format!("Unknown variant filter: '{}'", other)),
        }
    }
}

/// Classify one diploid call against the site's REF allele
///
/// # Examples
/// ```
/// use varwig_engine::models::GenotypeClass;
/// use varwig_engine::resolver::classify_call;
///
/// assert_eq!(classify_call("0|0", "A").unwrap(), GenotypeClass::Ref);
/// assert_eq!(classify_call("A/G", "A").unwrap(), GenotypeClass::Het);
/// assert_eq!(classify_call("1/1", "A").unwrap(), GenotypeClass::Hom);
/// assert!(classify_call("0/1/1", "A").is_err());
/// ```
pub fn classify_call(call: &str, ref_allele: &str) -> Result<GenotypeClass, GenotypeCallError> {
    let tokens: Vec<&str> = call.trim().split(['|', '/']).collect();

    if tokens.len() != 2 {
        return Err(GenotypeCallError::InvalidFormat(call.to_string()));
    }

    let mut alt_count = 0;
    for token in &tokens {
        if token.is_empty() || *token == "." {
            return Err(GenotypeCallError::MissingAllele(call.to_string()));
        }
        let is_ref = *token == "0" || token.eq_ignore_ascii_case(ref_allele);
        if !is_ref {
            alt_count += 1;
        }
    }

    GenotypeClass::from_alt_count(alt_count)
        .ok_or_else(|| GenotypeCallError::InvalidFormat(call.to_string()))
}

/// Resolves cohort genotypes through a variant store
pub struct GenotypeResolver {
    store: Arc<dyn VariantStore>,
    filter: VariantFilter,
}

impl GenotypeResolver {
    pub fn new(store: Arc<dyn VariantStore>, filter: VariantFilter) -> Self {
        Self { store, filter }
    }

    /// Genotype of every well-formed sample at a 1-based position
    ///
    /// Fails with `NotFound` when no record passing the filter overlaps the
    /// position. Samples with malformed calls are left out of the mapping.
    pub async fn resolve(
        &self,
        chrom: &str,
        position: u64,
    ) -> EngineResult<BTreeMap<String, GenotypeRecord>> {
        let records = self.store.lookup(chrom, position).await?;
        let total = records.len();

        let mut candidates = records.into_iter().filter(|r| self.filter.accepts(r));
        let record = candidates.next().ok_or_else(|| EngineError::NotFound {
            chrom: chrom.to_string(),
            position,
        })?;

        let extra = candidates.count();
        if extra > 0 {
            warn!(
                "{} records at {}:{} pass the variant filter, using the first",
                extra + 1,
                chrom,
                position
            );
        }
        debug!("Resolving {}:{} ({} of {} records kept)", chrom, position, extra + 1, total);

        let mut genotypes = BTreeMap::new();
        let mut excluded = 0usize;

        for call in record.calls {
            match classify_call(&call.call, &record.ref_allele) {
                Ok(class) => {
                    genotypes.insert(
                        call.sample_id.clone(),
                        GenotypeRecord {
                            sample_id: call.sample_id,
                            call: call.call,
                            class,
                        },
                    );
                }
                Err(e) => {
                    let err = EngineError::MalformedData {
                        sample: call.sample_id,
                        reason: e.to_string(),
                    };
                    warn!("Excluding sample: {}", err);
                    excluded += 1;
                }
            }
        }

        info!(
            "Resolved {} genotypes at {}:{} ({} excluded)",
            genotypes.len(),
            chrom,
            position,
            excluded
        );

        Ok(genotypes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::VariantCall;
    use crate::testing::FakeVariantStore;

    fn record(ref_allele: &str, alt: &str, calls: &[(&str, &str)]) -> VariantRecord {
        VariantRecord {
            chrom: "chr1".to_string(),
            start: 99,
            end: 100,
            ref_allele: ref_allele.to_string(),
            alt_alleles: alt.split(',').map(String::from).collect(),
            calls: calls
                .iter()
                .map(|(s, c)| VariantCall {
                    sample_id: s.to_string(),
                    call: c.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_classify_index_calls() {
        assert_eq!(classify_call("0|0", "C").unwrap(), GenotypeClass::Ref);
        assert_eq!(classify_call("0|1", "C").unwrap(), GenotypeClass::Het);
        assert_eq!(classify_call("1|0", "C").unwrap(), GenotypeClass::Het);
        assert_eq!(classify_call("1/1", "C").unwrap(), GenotypeClass::Hom);
    }

    #[test]
    fn test_classify_base_calls() {
        assert_eq!(classify_call("C/C", "C").unwrap(), GenotypeClass::Ref);
        assert_eq!(classify_call("C|T", "C").unwrap(), GenotypeClass::Het);
        assert_eq!(classify_call("T/T", "C").unwrap(), GenotypeClass::Hom);
        assert_eq!(classify_call("c/t", "C").unwrap(), GenotypeClass::Het);
    }

    #[test]
    fn test_classify_rejects_malformed() {
        assert!(matches!(
            classify_call("0/1/1", "C"),
            Err(GenotypeCallError::InvalidFormat(_))
        ));
        assert!(matches!(classify_call("0", "C"), Err(GenotypeCallError::InvalidFormat(_))));
        assert!(matches!(classify_call("./.", "C"), Err(GenotypeCallError::MissingAllele(_))));
        assert!(matches!(classify_call("0/", "C"), Err(GenotypeCallError::MissingAllele(_))));
    }

    #[test]
    fn test_snv_filter() {
        assert!(VariantFilter::Snv.accepts(&record("A", "G", &[])));
        assert!(VariantFilter::Snv.accepts(&record("A", "G,T", &[])));
        assert!(!VariantFilter::Snv.accepts(&record("A", "AG", &[])));
        assert!(!VariantFilter::Snv.accepts(&record("AT", "A", &[])));
        assert!(VariantFilter::All.accepts(&record("AT", "A", &[])));
        assert_eq!("snv".parse::<VariantFilter>().unwrap(), VariantFilter::Snv);
    }

    #[tokio::test]
    async fn test_resolve_excludes_malformed_calls() {
        let store = FakeVariantStore::new(vec![record(
            "A",
            "G",
            &[("S1", "0|0"), ("S2", "0|1"), ("S3", "1|1"), ("S4", "0|1|1"), ("S5", "./.")],
        )]);
        let resolver = GenotypeResolver::new(Arc::new(store), VariantFilter::Snv);

        let genotypes = resolver.resolve("chr1", 100).await.unwrap();
        assert_eq!(genotypes.len(), 3);
        assert_eq!(genotypes["S1"].class, GenotypeClass::Ref);
        assert_eq!(genotypes["S2"].class, GenotypeClass::Het);
        assert_eq!(genotypes["S3"].class, GenotypeClass::Hom);
        assert!(!genotypes.contains_key("S4"));
        assert!(!genotypes.contains_key("S5"));
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let resolver = GenotypeResolver::new(Arc::new(FakeVariantStore::new(vec![])), VariantFilter::All);
        let result = resolver.resolve("chr1", 100).await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_resolve_filter_skips_indels() {
        let store = FakeVariantStore::new(vec![
            record("AT", "A", &[("S1", "1/1")]),
            record("A", "G", &[("S1", "0/1")]),
        ]);
        let resolver = GenotypeResolver::new(Arc::new(store), VariantFilter::Snv);

        let genotypes = resolver.resolve("chr1", 100).await.unwrap();
        assert_eq!(genotypes["S1"].class, GenotypeClass::Het);

        let store = FakeVariantStore::new(vec![record("AT", "A", &[("S1", "1/1")])]);
        let resolver = GenotypeResolver::new(Arc::new(store), VariantFilter::Snv);
        assert!(matches!(
            resolver.resolve("chr1", 100).await,
            Err(EngineError::NotFound { .. })
        ));
    }
}
