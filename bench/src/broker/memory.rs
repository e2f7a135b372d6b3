//! In-process broker
//!
//! Mirrors the parts of AMQP queue semantics the harness depends on:
//! - declaring an existing queue is a no-op only if its properties match
//! - deleting a missing queue succeeds
//! - publishing to a missing queue through the default exchange drops the message
//! - `get` with auto-ack removes the message
//!
//! Non-copying publish is supported: the queue stores another handle to the
//! shared body instead of a fresh copy.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::client::{Broker, BrokerSession};
use super::types::{BrokerError, PublishMode, QueueSpec};

struct MemoryQueue {
    spec: QueueSpec,
    messages: VecDeque<Bytes>,
}

#[derive(Default)]
struct MemoryInner {
    queues: DashMap<String, MemoryQueue>,
    open_sessions: AtomicUsize,
    publish_attempts: AtomicUsize,
    /// Publishes beyond this many attempts (across all sessions) fail
    publish_limit: Option<usize>,
}

/// Broker living inside the benchmark process
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<MemoryInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every publish after the first `limit` attempts
    pub fn with_publish_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                publish_limit: Some(limit),
                ..Default::default()
            }),
        }
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    pub fn queue_exists(&self, queue: &str) -> bool {
        self.inner.queues.contains_key(queue)
    }

    pub fn queue_len(&self, queue: &str) -> Option<usize> {
        self.inner.queues.get(queue).map(|q| q.messages.len())
    }

    /// Put a message straight onto an existing queue, bypassing any session
    pub fn inject(&self, queue: &str, body: Bytes) -> Result<(), BrokerError> {
        let mut q = self
            .inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        q.messages.push_back(body);
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn supports_non_copying_publish(&self) -> bool {
        true
    }

    async fn open(&self) -> Result<Box<dyn BrokerSession>, BrokerError> {
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemorySession {
    inner: Arc<MemoryInner>,
    closed: AtomicBool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrokerError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn declare_queue(&self, queue: &str, spec: QueueSpec) -> Result<(), BrokerError> {
        self.ensure_open()?;
        match self.inner.queues.entry(queue.to_string()) {
            Entry::Occupied(existing) => {
                let existing = existing.get().spec;
                if existing != spec {
                    return Err(BrokerError::QueueMismatch {
                        queue: queue.to_string(),
                        detail: format!("existing {}, requested {}", existing, spec),
                    });
                }
            }
            Entry::Vacant(slot) => {
                debug!("Declared queue {}", queue);
                slot.insert(MemoryQueue {
                    spec,
                    messages: VecDeque::new(),
                });
            }
        }
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        if let Some((_, removed)) = self.inner.queues.remove(queue) {
            debug!(
                "Deleted queue {} with {} messages",
                queue,
                removed.messages.len()
            );
        }
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &Bytes,
        mode: PublishMode,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let attempt = self.inner.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.inner.publish_limit
            && attempt >= limit
        {
            return Err(BrokerError::PublishFailed(format!(
                "publish limit of {} reached",
                limit
            )));
        }

        let body = match mode {
            PublishMode::Copy => Bytes::copy_from_slice(payload),
            PublishMode::NoCopy => payload.clone(),
        };
        match self.inner.queues.get_mut(queue) {
            Some(mut q) => q.messages.push_back(body),
            None => debug!("Dropped unroutable message for queue {}", queue),
        }
        // A network publish suspends; let other workers run between publishes
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn message_count(&self, queue: &str) -> Result<u32, BrokerError> {
        self.ensure_open()?;
        self.inner
            .queues
            .get(queue)
            .map(|q| u32::try_from(q.messages.len()).unwrap_or(u32::MAX))
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))
    }

    async fn get(&self, queue: &str) -> Result<Option<Bytes>, BrokerError> {
        self.ensure_open()?;
        let mut q = self
            .inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        Ok(q.messages.pop_front())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
