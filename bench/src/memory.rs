//! Process memory probing and the background memory sampler

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default time between samples
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Reads the process's private memory in bytes
pub type MemoryProbe = fn() -> Option<u64>;

/// Private resident memory of the current process in bytes.
///
/// Uses `RssAnon` from `/proc/self/status`, falling back to `VmRSS`.
#[cfg(target_os = "linux")]
pub fn process_private_memory() -> Option<u64> {
    match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => parse_private_memory(&status),
        Err(e) => {
            warn!("Failed to read /proc/self/status: {}", e);
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn process_private_memory() -> Option<u64> {
    None
}

/// Extract private memory in bytes from `/proc/<pid>/status` contents
pub fn parse_private_memory(status: &str) -> Option<u64> {
    let field_kb = |name: &str| {
        status
            .lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|value| value.parse::<u64>().ok())
    };
    field_kb("RssAnon:")
        .or_else(|| field_kb("VmRSS:"))
        .map(|kb| kb * 1024)
}

/// Whole megabytes, truncated
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / 1024 / 1024
}

/// Render a memory reading for the console
pub fn format_mb(bytes: Option<u64>) -> String {
    match bytes {
        Some(b) => format!("{} MB", bytes_to_mb(b)),
        None => "n/a".to_string(),
    }
}

/// Samples taken while the sampler ran
#[derive(Debug, Clone, Default)]
pub struct MemoryTrace {
    pub samples: Vec<u64>,
}

impl MemoryTrace {
    pub fn peak(&self) -> Option<u64> {
        self.samples.iter().copied().max()
    }
}

/// Periodic memory sampler, run as its own task
pub struct MemorySampler {
    interval: Duration,
    probe: MemoryProbe,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new(SAMPLE_INTERVAL)
    }
}

impl MemorySampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            probe: process_private_memory,
        }
    }

    pub fn with_probe(mut self, probe: MemoryProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Start sampling on a dedicated thread. The first sample is taken immediately.
    ///
    /// The thread drives its own current-thread runtime, so busy publisher
    /// tasks on the caller's runtime cannot delay samples.
    pub fn start(self) -> io::Result<SamplerHandle> {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name("memory-sampler".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        warn!("Failed to build memory sampler runtime: {}", e);
                        return MemoryTrace::default();
                    }
                };
                runtime.block_on(self.sample_until(stop_rx))
            })?;
        Ok(SamplerHandle { stop_tx, thread })
    }

    async fn sample_until(self, mut stop_rx: oneshot::Receiver<()>) -> MemoryTrace {
        let mut trace = MemoryTrace::default();
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let reading = (self.probe)();
                    println!("Memory usage: {}", format_mb(reading));
                    if let Some(bytes) = reading {
                        trace.samples.push(bytes);
                    }
                }
            }
        }
        debug!("Memory sampler stopped after {} samples", trace.samples.len());
        trace
    }
}

/// Handle to a running sampler
pub struct SamplerHandle {
    stop_tx: oneshot::Sender<()>,
    thread: JoinHandle<MemoryTrace>,
}

impl SamplerHandle {
    /// Signal the sampler and wait for its thread to finish
    pub async fn stop(self) -> MemoryTrace {
        // The receiver is gone only if the thread already ended
        let _ = self.stop_tx.send(());
        let thread = self.thread;
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(trace)) => trace,
            Ok(Err(_)) => {
                warn!("Memory sampler thread panicked");
                MemoryTrace::default()
            }
            Err(e) => {
                warn!("Failed to join memory sampler thread: {}", e);
                MemoryTrace::default()
            }
        }
    }
}
