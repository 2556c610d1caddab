#![allow(clippy::doc_markdown)] // Allow technical terms like RabbitMQ, PostgreSQL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Venue Service
//!
//! Broker request/reply endpoint for the venue microservice.
//!
//! ## Overview
//!
//! Requests arrive on a topic exchange as JSON envelopes carrying a
//! correlation id (`msg_id`) and an intention (`CREATE`, `READ`, `UPDATE`,
//! `DELETE`). Each valid request is dispatched to the listeners registered for
//! its intention; listeners answer through a single-use reply handle, and the
//! reply is validated before it is published to the gateway exchange. Replies
//! that fail validation are replaced with a minimal correlated failure
//! envelope so the requester is never left waiting on a malformed answer.
//!
//! ## Module Organization
//!
//! - [`messaging`] - Broker handler, topology, codec, validators, dispatch and replies
//! - [`events`] - Typed listener registry with unsubscribable subscriptions
//! - [`state_machine`] - Connection lifecycle and the readiness gate
//! - [`venue`] - Venue request/reply types and validators
//! - [`database`] - Venue storage trait with memory and PostgreSQL backends
//! - [`binding`] - Wires the venue intentions to storage
//! - [`bootstrap`] - Process startup and shutdown
//! - [`config`] - Configuration loading
//! - [`logging`] - Structured logging
//! - [`error`] - Service-level errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use venue_service::binding::{bind, RequestTracker};
//! use venue_service::config::MessagingConfig;
//! use venue_service::database::MemoryVenueDatabase;
//! use venue_service::messaging::{AmqpConnector, BrokerHandler};
//! use venue_service::venue::{venue_response_validator, VenueMessageValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MessagingConfig::new("gateway", "request", "venues", vec!["venues.details.*".into()]);
//! let broker = BrokerHandler::new(config, VenueMessageValidator::shared(), venue_response_validator());
//!
//! bind(Arc::new(MemoryVenueDatabase::new()), &broker, Arc::new(RequestTracker::new()));
//! broker.start(AmqpConnector);
//! broker.wait_until_ready().await?;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod bootstrap;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod state_machine;
pub mod venue;

pub use config::{ConfigManager, MessagingConfig, ServiceConfig};
pub use error::{Result, ServiceError};
pub use messaging::{BrokerError, BrokerHandler, IncomingMessage, Intention, IntentionKind, Replier};
