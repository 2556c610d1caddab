//! # Broker Transport Abstractions
//!
//! The minimal slice of an AMQP-style broker the protocol handler relies on:
//! a connector that opens connections, connections that open channels and
//! report lifecycle events, and channels that declare topology, consume and
//! publish.
//!
//! Two implementations ship with the crate: [`super::amqp`] (RabbitMQ via
//! lapin) and [`super::memory`] (in-process broker for tests).

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConnectOptions;
use super::errors::{ConnectError, MessagingResult};

/// Exchange routing semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Routes on the exact routing key
    Direct,
    /// Routes on dot-separated patterns with `*` and `#` wildcards
    Topic,
    /// Routes to every bound queue
    Fanout,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Topic => write!(f, "topic"),
            Self::Fanout => write!(f, "fanout"),
        }
    }
}

/// Options for asserting an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeOptions {
    pub durable: bool,
    pub auto_delete: bool,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            durable: true,
            auto_delete: false,
        }
    }
}

/// Options for asserting a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Exclusive queues are owned by one connection; inboxes shared by several
    /// service instances must not be exclusive
    pub exclusive: bool,
    pub durable: bool,
    pub auto_delete: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            exclusive: false,
            durable: true,
            auto_delete: false,
        }
    }
}

/// Options for attaching a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumeOptions {
    /// Deliveries are settled by the broker on send; no redelivery on failure
    pub no_ack: bool,
}

/// A message delivered to a consumer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Bytes,
}

impl Delivery {
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload: payload.into(),
        }
    }
}

/// Stream of deliveries; ends when the broker cancels the consumer
pub type DeliveryStream = BoxStream<'static, Delivery>;

/// Connection-level lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Error(String),
    Closed,
}

/// Callback receiving connection lifecycle events
pub type ConnectionListener = Box<dyn Fn(ConnectionEvent) + Send + Sync>;

/// An open broker channel
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Declare an exchange, creating it if needed
    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> MessagingResult<()>;

    /// Declare a queue, creating it if needed; returns the queue's name
    async fn assert_queue(&self, name: &str, options: QueueOptions) -> MessagingResult<String>;

    /// Bind a queue to an exchange under a routing pattern
    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> MessagingResult<()>;

    /// Attach a consumer to a queue
    async fn consume(&self, queue: &str, options: ConsumeOptions)
        -> MessagingResult<DeliveryStream>;

    /// Publish a payload to an exchange
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Bytes)
        -> MessagingResult<()>;
}

/// An open broker connection
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    /// Open a new channel on this connection
    async fn create_channel(&self) -> MessagingResult<Self::Channel>;

    /// Register a listener for connection errors and closure
    fn on_event(&self, listener: ConnectionListener);
}

/// Opens broker connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: BrokerConnection;

    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Connection, ConnectError>;
}
