//! Broker-related types and error definitions

use thiserror::Error;

/// Errors that can occur while talking to a broker
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Queue {queue} already exists with different properties: {detail}")]
    QueueMismatch { queue: String, detail: String },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Publish failed: {0}")]
    PublishFailed(String),
}

/// Queue declaration properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSpec {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl QueueSpec {
    /// Non-durable, shared, removed once unused
    pub const TRANSIENT: Self = Self {
        durable: false,
        exclusive: false,
        auto_delete: true,
    };
}

impl std::fmt::Display for QueueSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "durable={}, exclusive={}, auto_delete={}",
            self.durable, self.exclusive, self.auto_delete
        )
    }
}

/// How the payload buffer is handed to the client on publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// The client copies the body for every publish
    #[default]
    Copy,
    /// The client keeps a reference to the shared body
    NoCopy,
}

impl PublishMode {
    pub fn from_non_copying(non_copying: bool) -> Self {
        if non_copying {
            PublishMode::NoCopy
        } else {
            PublishMode::Copy
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PublishMode::Copy => "copying",
            PublishMode::NoCopy => "non-copying",
        }
    }
}
