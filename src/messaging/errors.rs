//! # Messaging Error Types
//!
//! Structured error handling for the broker protocol layer using thiserror.
//!
//! Two families live here:
//!
//! - [`MessagingError`] is the `Result` error of individual transport and codec
//!   operations (declaring an exchange, publishing, decoding a payload).
//! - [`BrokerError`] is the payload of the handler's `error` event. It is what
//!   crosses the component boundary; nothing in this layer propagates a
//!   `BrokerError` as a panic or process exit.

use thiserror::Error;

/// Errors raised by transport, topology and codec operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Channel operation failed: {operation}: {message}")]
    ChannelOperation { operation: String, message: String },

    #[error("Exchange not found: {exchange}")]
    ExchangeNotFound { exchange: String },

    #[error("No queue named '{queue_name}'")]
    QueueNotFound { queue_name: String },

    #[error("Could not encode message: {message}")]
    MessageSerialization { message: String },

    #[error("Could not decode message: {message}")]
    MessageDeserialization { message: String },

    #[error("Broker client error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// A failed channel call; `operation` names the AMQP method
    pub fn channel_operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChannelOperation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn exchange_not_found(exchange: impl Into<String>) -> Self {
        Self::ExchangeNotFound {
            exchange: exchange.into(),
        }
    }

    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() || err.is_data() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from lapin::Error to MessagingError
impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidConnectionState(_) | lapin::Error::IOError(_) => {
                MessagingError::connection(err.to_string())
            }
            lapin::Error::InvalidChannelState(_) | lapin::Error::ProtocolError(_) => {
                MessagingError::channel_operation("amqp", err.to_string())
            }
            _ => MessagingError::internal(err.to_string()),
        }
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Why a connect attempt was rejected.
///
/// `Unknown` is reserved for rejections that carry no usable error value, such
/// as a connector future that panicked.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectError {
    #[error(transparent)]
    Failed(#[from] MessagingError),

    #[error("connection rejected without an error value")]
    Unknown,
}

/// Errors surfaced through the handler's `error` event
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// The initial connect call failed with an error value
    #[error("Failed to connect to the message broker: {0}")]
    Connect(MessagingError),

    /// The initial connect call failed without an error value
    #[error("Unknown error on broker connection reject")]
    UnknownConnect,

    /// A topology step (channel, exchange, queue, binding, consumer) failed
    #[error("Topology setup failed at {step}: {message}")]
    Topology { step: String, message: String },

    /// The connection raised an error after it was established
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    /// The connection was closed by the broker or the network
    #[error("disconnected from the message broker")]
    Disconnected,

    /// A dispatched business handler failed or panicked
    #[error("Handler for {intention} failed: {message}")]
    HandlerFailed { intention: String, message: String },
}

impl BrokerError {
    /// Create a topology error for the named setup step
    pub fn topology(step: impl Into<String>, source: &MessagingError) -> Self {
        Self::Topology {
            step: step.into(),
            message: source.to_string(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a handler failure error
    pub fn handler_failed(intention: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            intention: intention.into(),
            message: message.into(),
        }
    }

    /// Whether this error leaves the handler permanently unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::UnknownConnect | Self::Topology { .. } | Self::Disconnected
        )
    }
}

impl From<ConnectError> for BrokerError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Failed(inner) => BrokerError::Connect(inner),
            ConnectError::Unknown => BrokerError::UnknownConnect,
        }
    }
}
