// ==============================================================================
// main.rs - Varwig Precompute Worker Process
// ==============================================================================
// Description: Background worker that warms engine caches from a Redis queue
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client as RedisClient;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, Level};

use varwig_engine::{EngineConfig, EngineContext};

mod job_processor;
mod queue;

use job_processor::JobProcessor;
use queue::{JobQueue, JobSource, PrecomputePayload};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    let json_logs = std::env::var("VARWIG_LOG_JSON").map(|v| v == "1").unwrap_or(false);
    if json_logs {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(false)
            .compact()
            .init();
    }

    info!("Starting Varwig Worker v1.0.0");

    let config = EngineConfig::from_env().context("Invalid VARWIG_* configuration")?;

    // Queue connection (defaults to the values-cache server)
    let redis_url = config
        .redis_url
        .clone()
        .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

    let redis_client = RedisClient::open(redis_url).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to create Redis connection manager")?;

    info!("Connected to Redis");

    let engine = EngineContext::open(config)
        .await
        .context("Failed to open engine")?;

    let worker = Worker::new(engine, JobQueue::new(redis_conn));

    info!("Worker ready, waiting for jobs...");
    worker.run().await
}

/// Main worker struct
#[derive(Clone)]
struct Worker {
    engine: EngineContext,
    queue: JobQueue,
}

impl Worker {
    fn new(engine: EngineContext, queue: JobQueue) -> Self {
        Self { engine, queue }
    }

    /// Poll the queue until Ctrl-C, then drain jobs and close the engine
    async fn run(&self) -> Result<()> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, finishing current poll");
                flag.store(true, Ordering::SeqCst);
            }
        });

        let mut job_queue = self.queue.clone();
        let worker = self.clone();
        let mut jobs = poll_queue(&mut job_queue, &shutdown, move |payload| {
            let worker = worker.clone();
            async move { worker.process_job(payload).await }
        })
        .await;

        info!("Waiting for {} in-flight job(s)", jobs.len());
        while let Some(finished) = jobs.join_next().await {
            report_panic(finished);
        }

        self.engine.close().await;
        info!("Worker stopped");
        Ok(())
    }

    async fn process_job(&self, payload: PrecomputePayload) {
        let processor = JobProcessor::new(&self.engine, &self.queue);
        if let Err(e) = processor.process(&payload).await {
            error!("Job {} failed: {:#}", payload.job_id, e);
        }
    }
}

/// Dequeue and start jobs until `shutdown` is set
///
/// Each dequeue is awaited to completion and nothing races it, so a request
/// popped by the server is always handed to a job. Finished jobs are reaped
/// between polls. Returns the jobs still running.
async fn poll_queue<S, F, Fut>(source: &mut S, shutdown: &AtomicBool, start: F) -> JoinSet<()>
where
    S: JobSource,
    F: Fn(PrecomputePayload) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut jobs = JoinSet::new();

    while !shutdown.load(Ordering::SeqCst) {
        match source.dequeue().await {
            Ok(Some(payload)) => {
                info!("Received job: {} (peak {})", payload.job_id, payload.peak.id);

                // Process job in background (don't block queue)
                jobs.spawn(start(payload));
            }
            Ok(None) => {}
            Err(e) => {
                error!("Failed to dequeue job: {:#}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }

        while let Some(finished) = jobs.try_join_next() {
            report_panic(finished);
        }
    }

    jobs
}

fn report_panic(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        error!("Job task panicked: {}", e);
    }
}
