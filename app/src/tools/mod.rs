// ==============================================================================
// tools/mod.rs - External Tool Invocation
// ==============================================================================
// Description: Typed external-process invocations and the process-wide tool limiter
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Security: Arguments are passed as a structured vector, never through a shell
// ==============================================================================

pub mod bigwig;

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

pub use bigwig::{
    BigWigInfo, BigWigMerger, BigWigSummary, ChromLengthLookup, MergeRequest, SignalSummarizer,
    TrackMerger,
};

/// A single external program call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Program file name, for log and error messages
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

/// Captured result of a finished invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turn a non-zero exit into an `ExternalTool` error
    pub fn ensure_success(self, invocation: &ToolInvocation) -> EngineResult<Self> {
        if self.success {
            return Ok(self);
        }

        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());

        Err(EngineError::tool(
            invocation.name(),
            format!("exit status {}: {}", code, self.stderr.trim()),
        ))
    }
}

/// Boundary for running external programs (faked in tests)
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> EngineResult<ToolOutput>;
}

/// Runs invocations as child processes
///
/// Children are not killed when the awaiting future is dropped, so a tool
/// started for an abandoned request still completes and fills the cache.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> EngineResult<ToolOutput> {
        debug!("Running {:?} {:?}", invocation.program, invocation.args);

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|e| EngineError::tool(invocation.name(), format!("failed to start: {}", e)))?;

        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Process-wide counting semaphore around external tool capacity
#[derive(Debug, Clone)]
pub struct ToolLimiter {
    semaphore: Arc<Semaphore>,
    permits: usize,
}

impl ToolLimiter {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
        }
    }

    /// Wait for a free slot; the slot is returned when the permit drops
    pub async fn acquire(&self) -> EngineResult<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::ShuttingDown)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.permits
    }

    /// Wait until every in-flight invocation has returned its slot, then
    /// refuse new acquisitions.
    pub async fn close(&self) {
        let all = u32::try_from(self.permits).unwrap_or(u32::MAX);
        if let Ok(permits) = self.semaphore.acquire_many(all).await {
            permits.forget();
        }
        self.semaphore.close();
    }
}

pub(crate) fn path_arg(path: &Path) -> OsString {
    path.as_os_str().to_os_string()
}
