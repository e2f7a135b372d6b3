//! Broker client bindings
//!
//! This module provides:
//! - `Broker` / `BrokerSession` traits the harness is written against
//! - `AmqpBroker` for a real AMQP 0-9-1 broker (lapin)
//! - `MemoryBroker`, an in-process broker for dry runs and tests

mod amqp;
mod client;
mod memory;
mod types;

pub use amqp::AmqpBroker;
pub use client::{Broker, BrokerSession};
pub use memory::MemoryBroker;
pub use types::{BrokerError, PublishMode, QueueSpec};
