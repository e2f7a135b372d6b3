//! publish-bench library
//!
//! Publish throughput and memory benchmark for message brokers. The binary
//! is a thin CLI over `BenchmarkRunner`; the pieces are exported for the
//! integration tests.

pub mod broker;
pub mod config;
pub mod memory;
pub mod payload;
pub mod runner;
pub mod stats;
pub mod verify;
pub mod worker;

// Re-export commonly used types
pub use broker::{AmqpBroker, Broker, BrokerError, MemoryBroker};
pub use config::{BenchConfig, BrokerKind, ConfigError};
pub use runner::{BenchError, BenchmarkRunner, RunSummary};
pub use verify::VerificationReport;
