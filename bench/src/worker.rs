//! Publisher worker: one session, one queue, `iterations` sequential publishes

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::broker::{Broker, BrokerError, BrokerSession, PublishMode, QueueSpec};

/// Result of one worker's run
#[derive(Debug, Clone, Copy)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub published: u32,
    /// Session open through session close
    pub elapsed: Duration,
}

pub struct PublisherWorker {
    worker_id: usize,
    broker: Arc<dyn Broker>,
    queue: Arc<str>,
    payload: Bytes,
    iterations: u32,
    mode: PublishMode,
}

impl PublisherWorker {
    pub fn new(
        worker_id: usize,
        broker: Arc<dyn Broker>,
        queue: Arc<str>,
        payload: Bytes,
        iterations: u32,
        mode: PublishMode,
    ) -> Self {
        Self {
            worker_id,
            broker,
            queue,
            payload,
            iterations,
            mode,
        }
    }

    /// Open a session, publish, close. The session is closed on every path.
    pub async fn run(self) -> Result<WorkerReport, BrokerError> {
        let start = Instant::now();
        let session = self.broker.open().await?;

        let outcome = self.publish_all(session.as_ref()).await;
        let closed = session.close().await;
        let elapsed = start.elapsed();

        let published = match (outcome, closed) {
            (Ok(published), Ok(())) => published,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(
                        "Worker {} failed to close session after error: {}",
                        self.worker_id, close_err
                    );
                }
                return Err(e);
            }
        };

        debug!(
            "Worker {} published {} messages in {:?}",
            self.worker_id, published, elapsed
        );
        Ok(WorkerReport {
            worker_id: self.worker_id,
            published,
            elapsed,
        })
    }

    async fn publish_all(&self, session: &dyn BrokerSession) -> Result<u32, BrokerError> {
        session
            .declare_queue(&self.queue, QueueSpec::TRANSIENT)
            .await?;
        for _ in 0..self.iterations {
            session.publish(&self.queue, &self.payload, self.mode).await?;
        }
        Ok(self.iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;

    fn worker(broker: &MemoryBroker, iterations: u32) -> PublisherWorker {
        PublisherWorker::new(
            0,
            Arc::new(broker.clone()),
            Arc::from("worker-queue"),
            Bytes::from_static(b"payload"),
            iterations,
            PublishMode::Copy,
        )
    }

    #[tokio::test]
    async fn test_worker_publishes_iterations_and_closes() {
        let broker = MemoryBroker::new();

        let report = worker(&broker, 5).run().await.unwrap();

        assert_eq!(report.published, 5);
        assert_eq!(broker.queue_len("worker-queue"), Some(5));
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_worker_closes_session_on_publish_failure() {
        let broker = MemoryBroker::with_publish_limit(2);

        let err = worker(&broker, 5).run().await.unwrap_err();

        assert!(matches!(err, BrokerError::PublishFailed(_)));
        assert_eq!(broker.queue_len("worker-queue"), Some(2));
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_worker_fails_on_incompatible_queue() {
        let broker = MemoryBroker::new();
        let session = broker.open().await.unwrap();
        session
            .declare_queue(
                "worker-queue",
                QueueSpec {
                    durable: true,
                    ..QueueSpec::TRANSIENT
                },
            )
            .await
            .unwrap();
        session.close().await.unwrap();

        let err = worker(&broker, 1).run().await.unwrap_err();

        assert!(matches!(err, BrokerError::QueueMismatch { .. }));
        assert_eq!(broker.queue_len("worker-queue"), Some(0));
        assert_eq!(broker.open_sessions(), 0);
    }
}
