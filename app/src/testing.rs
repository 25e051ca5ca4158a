// ==============================================================================
// testing.rs - In-Memory Fakes for Unit Tests
// ==============================================================================
// Description: Scripted tool runner and fake collaborators (cfg(test) only)
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    Condition, Feature, GenomicWindow, GenotypeClass, GenotypeRecord, Peak, Strand, TrackReference,
    TrackView, Variant,
};
use crate::stores::{VariantRecord, VariantStore};
use crate::tools::{
    ChromLengthLookup, MergeRequest, SignalSummarizer, ToolInvocation, ToolOutput, ToolRunner,
    TrackMerger,
};

// ------------------------------------------------------------------------------
// Builders
// ------------------------------------------------------------------------------

pub fn genotype(sample: &str, class: GenotypeClass) -> GenotypeRecord {
    let call = match class {
        GenotypeClass::Ref => "0|0",
        GenotypeClass::Het => "0|1",
        GenotypeClass::Hom => "1|1",
    };

    GenotypeRecord {
        sample_id: sample.to_string(),
        call: call.to_string(),
        class,
    }
}

pub fn feature(strand: Option<Strand>) -> Feature {
    Feature {
        id: "ENSG00000000001".to_string(),
        chrom: "chr1".to_string(),
        start: 1_000,
        end: 2_000,
        strand,
        gene: Some("GENE1".to_string()),
    }
}

pub fn peak(assay: &str, strand: Option<Strand>) -> Peak {
    Peak {
        id: 42,
        snp: Variant {
            id: "rs123".to_string(),
            chrom: "chr1".to_string(),
            position: 1_500,
        },
        feature: feature(strand),
        assay: assay.to_string(),
        value_ni: 0.5,
        value_flu: 0.25,
    }
}

pub fn track(
    donor: &str,
    condition: Condition,
    class: GenotypeClass,
    view: TrackView,
    path: &str,
) -> TrackReference {
    TrackReference {
        donor: donor.to_string(),
        assay: "RNA-Seq".to_string(),
        condition,
        ancestry: "EU".to_string(),
        class,
        view,
        path: PathBuf::from(path),
    }
}

fn success(stdout: &str) -> ToolOutput {
    ToolOutput {
        success: true,
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

// ------------------------------------------------------------------------------
// Tool runner
// ------------------------------------------------------------------------------

type Script = Box<dyn Fn(&ToolInvocation) -> ToolOutput + Send + Sync>;

/// Answers every invocation from a closure and records it
pub struct ScriptedRunner {
    script: Script,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedRunner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&ToolInvocation) -> ToolOutput + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|_| success(""))
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> EngineResult<ToolOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());
        Ok((self.script)(invocation))
    }
}

// ------------------------------------------------------------------------------
// Variant store
// ------------------------------------------------------------------------------

/// Returns the same records for every lookup
pub struct FakeVariantStore {
    records: Vec<VariantRecord>,
    lookups: AtomicUsize,
}

impl FakeVariantStore {
    pub fn new(records: Vec<VariantRecord>) -> Self {
        Self {
            records,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VariantStore for FakeVariantStore {
    async fn lookup(&self, _chrom: &str, _position: u64) -> EngineResult<Vec<VariantRecord>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

// ------------------------------------------------------------------------------
// Signal summarizer
// ------------------------------------------------------------------------------

/// Summaries keyed by track path; unknown paths fail unless a constant is set
pub struct FakeSummarizer {
    values: HashMap<PathBuf, Option<f64>>,
    constant: Option<f64>,
    delay: Duration,
    calls: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSummarizer {
    pub fn with_values(values: &[(&str, Option<f64>)]) -> Self {
        Self {
            values: values.iter().map(|(p, v)| (PathBuf::from(p), *v)).collect(),
            constant: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self {
            constant: Some(value),
            ..Self::with_values(&[])
        }
    }

    pub fn with_delay_ms(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalSummarizer for FakeSummarizer {
    async fn summarize(&self, track: &Path, _window: &GenomicWindow) -> EngineResult<Option<f64>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls.lock().unwrap().push(track.to_path_buf());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match (self.values.get(track), self.constant) {
            (Some(value), _) => Ok(*value),
            (None, Some(value)) => Ok(Some(value)),
            (None, None) => Err(EngineError::tool("bigWigSummary", format!("cannot open {:?}", track))),
        }
    }
}

// ------------------------------------------------------------------------------
// Track merger
// ------------------------------------------------------------------------------

/// Writes placeholder output files; can be told to fail
pub struct FakeMerger {
    failing: AtomicBool,
    fail_on: Mutex<Vec<String>>,
    delay: Duration,
    requests: Mutex<Vec<MergeRequest>>,
}

impl FakeMerger {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            fail_on: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay_ms(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail any merge with an input whose file name is `name`
    pub fn fail_on(&self, name: &str) {
        self.fail_on.lock().unwrap().push(name.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<MergeRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn should_fail(&self, request: &MergeRequest) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        let names = self.fail_on.lock().unwrap();
        request.inputs.iter().any(|p| {
            p.file_name()
                .map(|n| names.iter().any(|name| n.to_string_lossy() == name.as_str()))
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl TrackMerger for FakeMerger {
    async fn merge(&self, request: &MergeRequest) -> EngineResult<()> {
        self.requests.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        // Partial output, as a crashing tool would leave behind
        tokio::fs::write(&request.output, b"partial")
            .await
            .map_err(|e| EngineError::io(&request.output, e))?;

        if self.should_fail(request) {
            return Err(EngineError::tool("bigWigMergePlus", "exit status 1: merge failed"));
        }

        tokio::fs::write(&request.output, b"merged")
            .await
            .map_err(|e| EngineError::io(&request.output, e))?;
        if let Some(deviation) = &request.deviation {
            tokio::fs::write(deviation, b"deviation")
                .await
                .map_err(|e| EngineError::io(deviation, e))?;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------
// Chromosome lengths
// ------------------------------------------------------------------------------

/// Every chromosome has the same length
pub struct FakeChromLengths {
    length: u64,
}

impl FakeChromLengths {
    pub fn new(length: u64) -> Self {
        Self { length }
    }
}

#[async_trait]
impl ChromLengthLookup for FakeChromLengths {
    async fn length_of(&self, _track: &Path, _chrom: &str) -> EngineResult<u64> {
        Ok(self.length)
    }
}
