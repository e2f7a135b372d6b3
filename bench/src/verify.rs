//! Post-run integrity check of the queue contents

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::broker::{Broker, BrokerError, BrokerSession};

/// At most this many messages are pulled and compared
pub const SAMPLE_LIMIT: u32 = 100;

/// Outcome of checking the queue after publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Ready messages found in the queue
    pub depth: u32,
    /// iterations × workers
    pub expected: u64,
    /// Messages the check attempted to pull
    pub checked: u32,
    /// Pulled messages equal to the payload
    pub correct: u32,
    /// Messages the queue ran out of before `checked` were pulled
    pub missing: u32,
}

impl VerificationReport {
    pub fn depth_matches(&self) -> bool {
        u64::from(self.depth) == self.expected
    }

    pub fn all_correct(&self) -> bool {
        self.correct == self.checked
    }

    pub fn is_capped(&self) -> bool {
        self.checked == SAMPLE_LIMIT
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Queue length\t: {} / {}", self.depth, self.expected)?;
        write!(f, "Valid messages\t: {} / {}", self.correct, self.checked)?;
        if self.is_capped() {
            write!(f, " (first {} of {})", SAMPLE_LIMIT, self.depth)?;
        }
        if self.missing > 0 {
            write!(f, " ({} missing)", self.missing)?;
        }
        Ok(())
    }
}

pub struct ResultVerifier {
    broker: Arc<dyn Broker>,
    queue: Arc<str>,
    expected: u64,
}

impl ResultVerifier {
    pub fn new(broker: Arc<dyn Broker>, queue: Arc<str>, expected: u64) -> Self {
        Self {
            broker,
            queue,
            expected,
        }
    }

    /// Sample the queue against `payload`, then delete the queue.
    ///
    /// The queue is deleted even if sampling fails. Every pulled message is
    /// auto-acked and therefore gone from the queue.
    pub async fn verify(&self, payload: &[u8]) -> Result<VerificationReport, BrokerError> {
        let session = self.broker.open().await?;

        let outcome = self.sample(session.as_ref(), payload).await;
        let deleted = session.delete_queue(&self.queue).await;
        let closed = session.close().await;

        let report = outcome?;
        deleted?;
        if let Err(e) = closed {
            warn!("Failed to close verification session: {}", e);
        }

        if !report.depth_matches() {
            warn!(
                "Queue {} holds {} messages, expected {}",
                self.queue, report.depth, report.expected
            );
        }
        info!(
            "Verified {} of {} sampled messages in {}",
            report.correct, report.checked, self.queue
        );
        Ok(report)
    }

    async fn sample(
        &self,
        session: &dyn BrokerSession,
        payload: &[u8],
    ) -> Result<VerificationReport, BrokerError> {
        let depth = session.message_count(&self.queue).await?;
        let checked = depth.min(SAMPLE_LIMIT);

        let mut correct = 0;
        let mut missing = 0;
        for _ in 0..checked {
            match session.get(&self.queue).await? {
                Some(body) if body_matches(&body, payload) => correct += 1,
                Some(_) => {}
                None => missing += 1,
            }
        }

        Ok(VerificationReport {
            depth,
            expected: self.expected,
            checked,
            correct,
            missing,
        })
    }
}

fn body_matches(body: &Bytes, payload: &[u8]) -> bool {
    body.as_ref() == payload
}
