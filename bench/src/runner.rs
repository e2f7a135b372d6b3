//! Benchmark orchestration
//!
//! A run goes through four phases:
//! - **NotStarted**: configuration is checked against broker capabilities
//! - **Running**: the queue is reset and the publisher workers run concurrently
//! - **Verifying**: the queue is sampled against the payload and deleted
//! - **Done**: the summary is returned
//!
//! Every failure before verification aborts the run. Nothing is retried.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::broker::{Broker, BrokerError};
use crate::config::{BenchConfig, ConfigError};
use crate::memory::{self, MemorySampler, SAMPLE_INTERVAL, format_mb};
use crate::payload;
use crate::stats::{Throughput, TimingStats};
use crate::verify::{ResultVerifier, VerificationReport};
use crate::worker::PublisherWorker;

/// Errors that abort a benchmark run
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Worker {worker} failed: {source}")]
    Worker {
        worker: usize,
        #[source]
        source: BrokerError,
    },

    #[error("Worker task did not complete: {0}")]
    Join(#[from] JoinError),

    #[error("No worker reported an elapsed time")]
    NoTimings,

    #[error("Failed to start memory sampler: {0}")]
    Sampler(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    NotStarted,
    Running,
    Verifying,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::NotStarted => "not started",
            RunPhase::Running => "running",
            RunPhase::Verifying => "verifying",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Aggregated results of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub broker: &'static str,
    pub publish_mode: &'static str,
    pub queue: String,
    pub payload_mb: u32,
    pub iterations: u32,
    pub workers: u32,
    /// Per-worker elapsed time in ms, indexed by worker id
    pub worker_elapsed_ms: Vec<u64>,
    pub timing: TimingStats,
    pub throughput: Option<Throughput>,
    pub startup_memory_bytes: Option<u64>,
    pub final_memory_bytes: Option<u64>,
    pub peak_memory_bytes: Option<u64>,
    /// Readings the memory sampler took during the run
    pub memory_samples: usize,
    pub verification: VerificationReport,
}

impl RunSummary {
    /// Single-line JSON for machine consumption
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Runs one benchmark against a broker binding
pub struct BenchmarkRunner {
    config: BenchConfig,
    broker: Arc<dyn Broker>,
    sample_interval: Duration,
}

impl BenchmarkRunner {
    pub fn new(config: BenchConfig, broker: Arc<dyn Broker>) -> Self {
        Self {
            config,
            broker,
            sample_interval: SAMPLE_INTERVAL,
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Reject configurations the broker binding cannot honor
    pub fn check_capabilities(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        if self.config.non_copying && !self.broker.supports_non_copying_publish() {
            return Err(ConfigError::NonCopyingUnsupported {
                broker: self.broker.name(),
            });
        }
        Ok(())
    }

    /// Run the full benchmark: publish, measure, verify
    pub async fn run(&self) -> Result<RunSummary, BenchError> {
        info!("Benchmark phase: {}", RunPhase::NotStarted);
        self.check_capabilities()?;

        let payload = payload::generate(self.config.payload_mb)?;
        let startup_memory = memory::process_private_memory();
        self.print_banner(startup_memory);

        println!();
        println!("---  Start  ---");
        info!("Benchmark phase: {}", RunPhase::Running);

        let sampler = MemorySampler::new(self.sample_interval).start()?;
        let elapsed = match self.publish(&payload).await {
            Ok(elapsed) => elapsed,
            Err(e) => {
                sampler.stop().await;
                return Err(e);
            }
        };
        let trace = sampler.stop().await;

        let timing = TimingStats::from_samples(&elapsed).ok_or(BenchError::NoTimings)?;
        let throughput = Throughput::compute(
            self.config.expected_messages(),
            self.config.payload_mb,
            &elapsed,
        );
        let final_memory = memory::process_private_memory();

        println!();
        println!("--- Results ---");
        println!("{}", timing);
        if let Some(throughput) = throughput {
            println!("{}", throughput);
        }
        println!("Memory\t\t: {}", format_mb(final_memory));
        println!("Peak memory\t: {}", format_mb(trace.peak()));

        info!("Benchmark phase: {}", RunPhase::Verifying);
        let verifier = ResultVerifier::new(
            Arc::clone(&self.broker),
            Arc::from(self.config.queue.as_str()),
            self.config.expected_messages(),
        );
        let verification = verifier.verify(&payload).await?;
        println!("{}", verification);

        info!("Benchmark phase: {}", RunPhase::Done);
        Ok(RunSummary {
            broker: self.broker.name(),
            publish_mode: self.config.publish_mode().name(),
            queue: self.config.queue.clone(),
            payload_mb: self.config.payload_mb,
            iterations: self.config.iterations,
            workers: self.config.workers,
            worker_elapsed_ms: elapsed
                .iter()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .collect(),
            timing,
            throughput,
            startup_memory_bytes: startup_memory,
            final_memory_bytes: final_memory,
            peak_memory_bytes: trace.peak(),
            memory_samples: trace.samples.len(),
            verification,
        })
    }

    fn print_banner(&self, startup_memory: Option<u64>) {
        println!(
            "Broker\t\t: {} ({} publish)",
            self.broker.name(),
            self.config.publish_mode().name()
        );
        println!("Body size\t: {} MB", self.config.payload_mb);
        println!("Iterations\t: {}", self.config.iterations);
        println!("Tasks\t\t: {}", self.config.workers);
        println!("Non-copying\t: {}", self.config.non_copying);
        println!("Queue\t\t: {}", self.config.queue);
        println!("Startup memory\t: {}", format_mb(startup_memory));
    }

    /// Delete any leftover queue with a throwaway session
    async fn reset_queue(&self) -> Result<(), BrokerError> {
        let session = self.broker.open().await?;
        let deleted = session.delete_queue(&self.config.queue).await;
        let closed = session.close().await;
        deleted?;
        closed?;
        info!("Reset queue {}", self.config.queue);
        Ok(())
    }

    /// Fan out the workers and join them all.
    ///
    /// Elapsed times come back in worker-id order. Workers are never aborted,
    /// so each one closes its own session before the first error is returned.
    async fn publish(&self, payload: &Bytes) -> Result<Vec<Duration>, BenchError> {
        self.reset_queue().await?;

        let queue: Arc<str> = Arc::from(self.config.queue.as_str());
        let worker_count = self.config.workers as usize;
        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let worker = PublisherWorker::new(
                worker_id,
                Arc::clone(&self.broker),
                Arc::clone(&queue),
                payload.clone(),
                self.config.iterations,
                self.config.publish_mode(),
            );
            workers.spawn(async move { (worker_id, worker.run().await) });
        }

        let mut slots: Vec<Option<Duration>> = vec![None; worker_count];
        let mut first_error: Option<BenchError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((worker_id, Ok(report))) => slots[worker_id] = Some(report.elapsed),
                Ok((worker, Err(source))) => {
                    error!("Worker {} failed: {}", worker, source);
                    if first_error.is_none() {
                        first_error = Some(BenchError::Worker { worker, source });
                    }
                }
                Err(e) => {
                    error!("Worker task did not complete: {}", e);
                    if first_error.is_none() {
                        first_error = Some(BenchError::Join(e));
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
