//! Broker and session trait definitions

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{BrokerError, PublishMode, QueueSpec};

/// Trait for broker client bindings (AMQP or in-process)
#[async_trait]
pub trait Broker: Send + Sync {
    /// Short name used in the banner and logs
    fn name(&self) -> &'static str;

    /// Whether publishes can hand the body over without a per-call copy
    fn supports_non_copying_publish(&self) -> bool {
        false
    }

    /// Open a dedicated connection with one channel on it
    async fn open(&self) -> Result<Box<dyn BrokerSession>, BrokerError>;
}

/// One connection+channel pair, owned exclusively by its opener
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Declare a queue. Idempotent when `spec` matches the existing queue.
    async fn declare_queue(&self, queue: &str, spec: QueueSpec) -> Result<(), BrokerError>;

    /// Delete a queue. Deleting a missing queue is not an error.
    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Publish to the default exchange with `queue` as routing key
    async fn publish(
        &self,
        queue: &str,
        payload: &Bytes,
        mode: PublishMode,
    ) -> Result<(), BrokerError>;

    /// Number of ready messages in the queue
    async fn message_count(&self, queue: &str) -> Result<u32, BrokerError>;

    /// Fetch one message with auto-ack, `None` when the queue is empty
    async fn get(&self, queue: &str) -> Result<Option<Bytes>, BrokerError>;

    /// Close the channel, then the connection
    async fn close(&self) -> Result<(), BrokerError>;
}
