//! Elapsed-time statistics across publisher workers

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Whole milliseconds, truncated
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Timing summary of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimingStats {
    /// Exactly one worker ran
    Single { time_ms: u64 },
    /// Several workers ran
    Spread {
        avg_ms: u64,
        min_ms: u64,
        max_ms: u64,
    },
}

impl TimingStats {
    /// Summarize per-worker elapsed times, `None` when there are no samples
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        match samples {
            [] => None,
            [only] => Some(TimingStats::Single {
                time_ms: millis(*only),
            }),
            _ => {
                let total_ns: u128 = samples.iter().map(Duration::as_nanos).sum();
                let avg_ns = total_ns / samples.len() as u128;
                let avg_ms = u64::try_from(avg_ns / 1_000_000).unwrap_or(u64::MAX);
                let min_ms = samples.iter().copied().map(millis).min()?;
                let max_ms = samples.iter().copied().map(millis).max()?;
                Some(TimingStats::Spread {
                    avg_ms,
                    min_ms,
                    max_ms,
                })
            }
        }
    }
}

impl fmt::Display for TimingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingStats::Single { time_ms } => write!(f, "Time\t\t: {} ms", time_ms),
            TimingStats::Spread {
                avg_ms,
                min_ms,
                max_ms,
            } => {
                writeln!(f, "Avg time\t: {} ms", avg_ms)?;
                writeln!(f, "Min time\t: {} ms", min_ms)?;
                write!(f, "Max time\t: {} ms", max_ms)
            }
        }
    }
}

/// Aggregate publish rate over the slowest worker's elapsed time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Throughput {
    pub messages_per_sec: f64,
    pub mb_per_sec: f64,
}

impl Throughput {
    pub fn compute(messages: u64, payload_mb: u32, samples: &[Duration]) -> Option<Self> {
        let wall = samples.iter().max()?.as_secs_f64();
        if wall <= 0.0 {
            return None;
        }
        let messages_per_sec = messages as f64 / wall;
        Some(Self {
            messages_per_sec,
            mb_per_sec: messages_per_sec * f64::from(payload_mb),
        })
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Throughput\t: {:.1} msg/s, {:.1} MB/s",
            self.messages_per_sec, self.mb_per_sec
        )
    }
}
