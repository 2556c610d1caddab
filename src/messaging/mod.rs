//! # Messaging Module
//!
//! Broker request/reply protocol: AMQP topology, inbound validation and
//! dispatch by intention, validated replies with a correlated fallback.

pub mod amqp;
pub mod codec;
pub mod errors;
pub mod handler;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod router;
pub mod topology;
pub mod transport;
pub mod validator;

pub use amqp::{AmqpChannel, AmqpConnection, AmqpConnector};
pub use errors::{BrokerError, ConnectError, MessagingError, MessagingResult};
pub use handler::BrokerHandler;
pub use memory::{ConnectFault, MemoryBroker};
pub use message::{
    fallback_envelope, IncomingMessage, Intention, IntentionKind, FALLBACK_STATUS,
    MSG_ID_FIELD, MSG_INTENTION_FIELD, STATUS_FIELD,
};
pub use publisher::{Replier, ReplyOutcome, ReplyPublisher};
pub use router::{IntentionHandlers, Router};
pub use transport::{
    BrokerChannel, BrokerConnection, ConnectionEvent, Connector, Delivery, ExchangeKind,
};
pub use validator::{MessageValidator, SharedValidator, ValidationError};
