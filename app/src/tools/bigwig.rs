// ==============================================================================
// tools/bigwig.rs - BigWig Summary, Merge and Chromosome-Size Tools
// ==============================================================================
// Description: Collaborator traits for signal tools and their UCSC-style implementations
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Command lines:
//   bigWigSummary <file> <chrom> <start> <end> 1
//   bigWigInfo -chroms <file>
//   bigWigMergePlus <in1> [<in2> ...] <out> -range=<chrom>:<start>-<end> [-deviation=<dev>]
// ==============================================================================

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{path_arg, ToolInvocation, ToolRunner};
use crate::error::{EngineError, EngineResult};
use crate::models::GenomicWindow;

/// Computes one scalar over a window of a track; `None` means no coverage
#[async_trait]
pub trait SignalSummarizer: Send + Sync {
    async fn summarize(&self, track: &Path, window: &GenomicWindow) -> EngineResult<Option<f64>>;
}

/// Inputs for one merge computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub inputs: Vec<PathBuf>,
    pub window: GenomicWindow,
    pub output: PathBuf,
    pub deviation: Option<PathBuf>,
}

/// Merges several tracks over a window into one derived track
#[async_trait]
pub trait TrackMerger: Send + Sync {
    async fn merge(&self, request: &MergeRequest) -> EngineResult<()>;
}

/// Chromosome length as recorded in a track file's header
#[async_trait]
pub trait ChromLengthLookup: Send + Sync {
    async fn length_of(&self, track: &Path, chrom: &str) -> EngineResult<u64>;
}

/// `bigWigSummary` wrapper
pub struct BigWigSummary {
    runner: Arc<dyn ToolRunner>,
    program: PathBuf,
}

impl BigWigSummary {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn invocation(&self, track: &Path, window: &GenomicWindow) -> ToolInvocation {
        ToolInvocation::new(&self.program)
            .arg(path_arg(track))
            .arg(&window.chrom)
            .arg(window.start.to_string())
            .arg(window.end.to_string())
            .arg("1")
    }
}

#[async_trait]
impl SignalSummarizer for BigWigSummary {
    async fn summarize(&self, track: &Path, window: &GenomicWindow) -> EngineResult<Option<f64>> {
        let invocation = self.invocation(track, window);
        let output = self.runner.run(&invocation).await?;

        // bigWigSummary exits non-zero on empty regions
        if output.stderr.to_ascii_lowercase().contains("no data") {
            debug!("No data in {} for {:?}", window, track);
            return Ok(None);
        }

        let output = output.ensure_success(&invocation)?;
        parse_summary(&output.stdout).map_err(|message| EngineError::tool(invocation.name(), message))
    }
}

/// Parse the single-bin summary line
fn parse_summary(stdout: &str) -> Result<Option<f64>, String> {
    let token = stdout
        .split_whitespace()
        .next()
        .ok_or_else(|| "empty output".to_string())?;

    if token == "n/a" {
        return Ok(None);
    }

    let value = token
        .parse::<f64>()
        .map_err(|e| format!("unreadable output '{}': {}", token, e))?;

    if value.is_nan() {
        return Ok(None);
    }

    Ok(Some(value))
}

/// `bigWigInfo -chroms` wrapper with per-(file, chrom) memoisation
pub struct BigWigInfo {
    runner: Arc<dyn ToolRunner>,
    program: PathBuf,
    lengths: Mutex<HashMap<(PathBuf, String), u64>>,
}

impl BigWigInfo {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
            lengths: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, track: &Path, chrom: &str) -> Option<u64> {
        self.lengths
            .lock()
            .ok()?
            .get(&(track.to_path_buf(), chrom.to_string()))
            .copied()
    }

    fn remember(&self, track: &Path, sizes: &HashMap<String, u64>) {
        if let Ok(mut lengths) = self.lengths.lock() {
            for (chrom, size) in sizes {
                lengths.insert((track.to_path_buf(), chrom.clone()), *size);
            }
        }
    }
}

#[async_trait]
impl ChromLengthLookup for BigWigInfo {
    async fn length_of(&self, track: &Path, chrom: &str) -> EngineResult<u64> {
        if let Some(length) = self.cached(track, chrom) {
            return Ok(length);
        }

        let invocation = ToolInvocation::new(&self.program)
            .arg("-chroms")
            .arg(path_arg(track));
        let output = self.runner.run(&invocation).await?.ensure_success(&invocation)?;

        let sizes = parse_chrom_sizes(&output.stdout);
        self.remember(track, &sizes);

        sizes.get(chrom).copied().ok_or_else(|| {
            EngineError::tool(
                invocation.name(),
                format!("chromosome {} not present in {:?}", chrom, track),
            )
        })
    }
}

/// Parse the indented `name id size` lines of `bigWigInfo -chroms`
fn parse_chrom_sizes(stdout: &str) -> HashMap<String, u64> {
    stdout
        .lines()
        .filter(|line| line.starts_with(char::is_whitespace))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                return None;
            }
            let size = fields[2].parse::<u64>().ok()?;
            Some((fields[0].to_string(), size))
        })
        .collect()
}

/// `bigWigMergePlus` wrapper
pub struct BigWigMerger {
    runner: Arc<dyn ToolRunner>,
    program: PathBuf,
}

impl BigWigMerger {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn invocation(&self, request: &MergeRequest) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(&self.program)
            .args(request.inputs.iter().map(|p| path_arg(p)))
            .arg(path_arg(&request.output))
            .arg(format!(
                "-range={}:{}-{}",
                request.window.chrom, request.window.start, request.window.end
            ));

        if let Some(deviation) = &request.deviation {
            let mut flag = std::ffi::OsString::from("-deviation=");
            flag.push(deviation.as_os_str());
            invocation = invocation.arg(flag);
        }

        invocation
    }
}

#[async_trait]
impl TrackMerger for BigWigMerger {
    async fn merge(&self, request: &MergeRequest) -> EngineResult<()> {
        let invocation = self.invocation(request);
        self.runner.run(&invocation).await?.ensure_success(&invocation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use crate::tools::ToolOutput;
    use std::ffi::OsString;

    #[test]
    fn test_parse_summary() {
        assert_eq!(parse_summary("3.25\n"), Ok(Some(3.25)));
        assert_eq!(parse_summary("n/a\n"), Ok(None));
        assert_eq!(parse_summary("0\n"), Ok(Some(0.0)));
        assert!(parse_summary("").is_err());
        assert!(parse_summary("garbage").is_err());
    }

    #[test]
    fn test_parse_chrom_sizes() {
        let stdout = "version: 4\nisCompressed: yes\nchromCount: 2\n\tchr1 0 248956422\n\tchr2 1 242193529\nbasesCovered: 10\n";
        let sizes = parse_chrom_sizes(stdout);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes["chr1"], 248_956_422);
        assert_eq!(sizes["chr2"], 242_193_529);
    }

    #[tokio::test]
    async fn test_summary_no_data_is_absent() {
        let runner = Arc::new(ScriptedRunner::new(|_| ToolOutput {
            success: false,
            exit_code: Some(255),
            stdout: String::new(),
            stderr: "no data in region chr1:10-20 in a.bw\n".to_string(),
        }));
        let summary = BigWigSummary::new(runner.clone(), "bigWigSummary");

        let value = summary
            .summarize(Path::new("a.bw"), &GenomicWindow::new("chr1", 10, 20))
            .await
            .unwrap();
        assert_eq!(value, None);

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec![
                OsString::from("a.bw"),
                OsString::from("chr1"),
                OsString::from("10"),
                OsString::from("20"),
                OsString::from("1"),
            ]
        );
    }

    #[tokio::test]
    async fn test_summary_failure_is_tool_error() {
        let runner = Arc::new(ScriptedRunner::new(|_| ToolOutput {
            success: false,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "Couldn't open a.bw\n".to_string(),
        }));
        let summary = BigWigSummary::new(runner, "bigWigSummary");

        let result = summary
            .summarize(Path::new("a.bw"), &GenomicWindow::new("chr1", 10, 20))
            .await;
        assert!(matches!(result, Err(EngineError::ExternalTool { .. })));
    }

    #[tokio::test]
    async fn test_chrom_length_is_memoised() {
        let runner = Arc::new(ScriptedRunner::new(|_| ToolOutput {
            success: true,
            exit_code: Some(0),
            stdout: "chromCount: 1\n\tchr7 0 159345973\n".to_string(),
            stderr: String::new(),
        }));
        let info = BigWigInfo::new(runner.clone(), "bigWigInfo");

        assert_eq!(info.length_of(Path::new("a.bw"), "chr7").await.unwrap(), 159_345_973);
        assert_eq!(info.length_of(Path::new("a.bw"), "chr7").await.unwrap(), 159_345_973);
        assert_eq!(runner.invocations().len(), 1);

        assert!(info.length_of(Path::new("a.bw"), "chr8").await.is_err());
    }

    #[test]
    fn test_merge_command_line() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let merger = BigWigMerger::new(runner, "bigWigMergePlus");
        let request = MergeRequest {
            inputs: vec![PathBuf::from("a.bw"), PathBuf::from("b.bw")],
            window: GenomicWindow::new("chr1", 0, 5000),
            output: PathBuf::from("out.bw"),
            deviation: Some(PathBuf::from("out-dev.bw")),
        };

        let invocation = merger.invocation(&request);
        assert_eq!(
            invocation.args,
            vec![
                OsString::from("a.bw"),
                OsString::from("b.bw"),
                OsString::from("out.bw"),
                OsString::from("-range=chr1:0-5000"),
                OsString::from("-deviation=out-dev.bw"),
            ]
        );
    }
}
