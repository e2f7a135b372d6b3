//! AMQP 0-9-1 broker binding backed by lapin

use async_trait::async_trait;
use bytes::Bytes;
use lapin::options::{
    BasicGetOptions, BasicPublishOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, warn};

use super::client::{Broker, BrokerSession};
use super::types::{BrokerError, PublishMode, QueueSpec};

const REPLY_SUCCESS: u16 = 200;

/// Broker reached over the network. The stock client always copies the body.
pub struct AmqpBroker {
    uri: String,
}

impl AmqpBroker {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    fn properties() -> ConnectionProperties {
        ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio)
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    fn name(&self) -> &'static str {
        "amqp"
    }

    async fn open(&self) -> Result<Box<dyn BrokerSession>, BrokerError> {
        let connection = Connection::connect(&self.uri, Self::properties()).await?;
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close(REPLY_SUCCESS, "OK").await {
                    warn!("Failed to close connection after channel error: {}", close_err);
                }
                return Err(e.into());
            }
        };
        debug!("Opened AMQP channel {}", channel.id());
        Ok(Box::new(AmqpSession {
            connection,
            channel,
        }))
    }
}

struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

fn soft_error(err: &lapin::Error) -> Option<&AMQPSoftError> {
    match err {
        lapin::Error::ProtocolError(e) => match e.kind() {
            AMQPErrorKind::Soft(soft) => Some(soft),
            _ => None,
        },
        _ => None,
    }
}

fn is_not_found(err: &lapin::Error) -> bool {
    matches!(soft_error(err), Some(AMQPSoftError::NOTFOUND))
}

/// Redeclaring a queue with other properties is refused with 406
fn is_precondition_failed(err: &lapin::Error) -> bool {
    matches!(soft_error(err), Some(AMQPSoftError::PRECONDITIONFAILED))
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn declare_queue(&self, queue: &str, spec: QueueSpec) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: spec.durable,
            exclusive: spec.exclusive,
            auto_delete: spec.auto_delete,
            ..Default::default()
        };
        match self
            .channel
            .queue_declare(queue, options, FieldTable::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_precondition_failed(&e) => Err(BrokerError::QueueMismatch {
                queue: queue.to_string(),
                detail: format!("requested {}: {}", spec, e),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &Bytes,
        mode: PublishMode,
    ) -> Result<(), BrokerError> {
        if mode == PublishMode::NoCopy {
            return Err(BrokerError::Unsupported("non-copying publish"));
        }
        // Confirms are not enabled on the channel, so the returned confirm is not awaited
        let _confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await?;
        Ok(())
    }

    async fn message_count(&self, queue: &str) -> Result<u32, BrokerError> {
        let options = QueueDeclareOptions {
            passive: true,
            ..Default::default()
        };
        match self
            .channel
            .queue_declare(queue, options, FieldTable::default())
            .await
        {
            Ok(declared) => Ok(declared.message_count()),
            Err(e) if is_not_found(&e) => Err(BrokerError::QueueNotFound(queue.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, queue: &str) -> Result<Option<Bytes>, BrokerError> {
        let message = self
            .channel
            .basic_get(queue, BasicGetOptions { no_ack: true })
            .await?;
        Ok(message.map(|m| Bytes::from(m.delivery.data)))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let channel_result = self.channel.close(REPLY_SUCCESS, "OK").await;
        let connection_result = self.connection.close(REPLY_SUCCESS, "OK").await;
        channel_result?;
        connection_result?;
        Ok(())
    }
}
