//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

use async_trait::async_trait;
use publish_bench::broker::BrokerSession;
use publish_bench::{BenchConfig, Broker, BrokerError, BrokerKind, MemoryBroker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Sampler interval used by tests, short enough to record a few samples
#[allow(dead_code)]
pub const TEST_SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Config for a run against the in-process broker
pub fn memory_config(queue: &str, iterations: u32, workers: u32) -> BenchConfig {
    BenchConfig {
        iterations,
        payload_mb: 1,
        workers,
        queue: queue.to_string(),
        broker: BrokerKind::Memory,
        ..Default::default()
    }
}

/// In-process broker that, like the stock AMQP client, cannot publish without copying
#[allow(dead_code)]
pub struct CopyingOnlyBroker {
    inner: MemoryBroker,
    opens: AtomicUsize,
}

#[allow(dead_code)]
impl CopyingOnlyBroker {
    pub fn new(inner: MemoryBroker) -> Self {
        Self {
            inner,
            opens: AtomicUsize::new(0),
        }
    }

    /// Sessions opened so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for CopyingOnlyBroker {
    fn name(&self) -> &'static str {
        "copying-only"
    }

    async fn open(&self) -> Result<Box<dyn BrokerSession>, BrokerError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open().await
    }
}

/// Initialize test logging for detailed output
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "publish_bench=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
