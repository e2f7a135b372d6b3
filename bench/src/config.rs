//! Benchmark configuration
//!
//! Configuration comes from the command line only. `Args` is the raw clap
//! surface, `BenchConfig` the validated, immutable form shared by the run.

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::broker::PublishMode;
use crate::payload;

/// AMQP short strings cap queue names at 255 bytes
const MAX_QUEUE_NAME_LEN: usize = 255;

/// Configuration errors, all raised before any broker interaction
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    NotPositive(&'static str),

    #[error("Invalid queue name {0:?}: must be 1 to 255 bytes")]
    InvalidQueueName(String),

    #[error("Payload of {0} MB does not fit in memory on this platform")]
    PayloadTooLarge(u32),

    #[error("Non-copying publish is not supported by the {broker} broker client")]
    NonCopyingUnsupported { broker: &'static str },
}

/// Which broker binding to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BrokerKind {
    /// AMQP 0-9-1 broker over the network
    #[default]
    Amqp,
    /// In-process broker, no network involved
    Memory,
}

impl BrokerKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrokerKind::Amqp => "amqp",
            BrokerKind::Memory => "memory",
        }
    }
}

/// Command line arguments
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Measure publish throughput and memory against a message broker"
)]
pub struct Args {
    /// Number of publishes per task
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub iterations: u32,

    /// Message body size in megabytes
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub mb: u32,

    /// Number of concurrent publisher tasks
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub tasks: u32,

    /// Don't copy the message body on publish
    #[arg(long = "nc", default_value_t = false)]
    pub non_copying: bool,

    /// Queue name
    #[arg(short, long, default_value = "test-queue")]
    pub queue: String,

    /// Broker binding
    #[arg(long, value_enum, default_value_t = BrokerKind::Amqp)]
    pub broker: BrokerKind,

    /// AMQP connection URI
    #[arg(long, default_value = "amqp://127.0.0.1:5672/%2f")]
    pub uri: String,

    /// Print the run summary as JSON after the report
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Validated benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Publishes per worker
    pub iterations: u32,
    /// Payload size in megabytes
    pub payload_mb: u32,
    /// Number of publisher workers
    pub workers: u32,
    /// Hand the payload to the client without a per-publish copy
    pub non_copying: bool,
    /// Target queue
    pub queue: String,
    /// Broker binding
    pub broker: BrokerKind,
    /// AMQP connection URI
    pub uri: String,
    /// Emit the JSON summary
    pub json: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            payload_mb: 1,
            workers: 1,
            non_copying: false,
            queue: "test-queue".to_string(),
            broker: BrokerKind::Amqp,
            uri: "amqp://127.0.0.1:5672/%2f".to_string(),
            json: false,
        }
    }
}

impl BenchConfig {
    /// Validate parsed arguments
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let config = Self {
            iterations: args.iterations,
            payload_mb: args.mb,
            workers: args.tasks,
            non_copying: args.non_copying,
            queue: args.queue,
            broker: args.broker,
            uri: args.uri,
            json: args.json,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("iterations", self.iterations),
            ("mb", self.payload_mb),
            ("tasks", self.workers),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.queue.is_empty() || self.queue.len() > MAX_QUEUE_NAME_LEN {
            return Err(ConfigError::InvalidQueueName(self.queue.clone()));
        }
        if payload::payload_len(self.payload_mb).is_none() {
            return Err(ConfigError::PayloadTooLarge(self.payload_mb));
        }
        Ok(())
    }

    /// Total messages the run should leave in the queue
    pub fn expected_messages(&self) -> u64 {
        u64::from(self.iterations) * u64::from(self.workers)
    }

    pub fn publish_mode(&self) -> PublishMode {
        PublishMode::from_non_copying(self.non_copying)
    }
}
