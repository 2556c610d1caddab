//! # Topology Setup
//!
//! Builds the exchanges, queue, bindings and consumer a broker handler needs,
//! on an already-open connection:
//!
//! 1. response channel, gateway exchange (direct)
//! 2. request channel, request exchange (topic, non-durable)
//! 3. inbox queue (non-exclusive, shared by every instance of the service)
//! 4. one binding per unique topic, all awaited together
//! 5. a no-ack consumer on the inbox
//!
//! The first failing step aborts setup and is reported as
//! [`BrokerError::Topology`] naming that step.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

use super::errors::BrokerError;
use super::transport::{
    BrokerChannel, BrokerConnection, ConsumeOptions, DeliveryStream, ExchangeKind,
    ExchangeOptions, QueueOptions,
};
use crate::config::MessagingConfig;

/// Names of the setup steps, as reported in topology errors
pub mod steps {
    pub const RESPONSE_CHANNEL: &str = "response_channel";
    pub const GATEWAY_EXCHANGE: &str = "gateway_exchange";
    pub const REQUEST_CHANNEL: &str = "request_channel";
    pub const REQUEST_EXCHANGE: &str = "request_exchange";
    pub const INBOX_QUEUE: &str = "inbox_queue";
    pub const BIND_TOPICS: &str = "bind_topics";
    pub const CONSUME: &str = "consume";
}

/// Channels and consumer produced by a successful setup
pub struct Topology {
    /// Channel replies are published on
    pub response: Arc<dyn BrokerChannel>,
    /// Channel the inbox consumer lives on
    pub request: Arc<dyn BrokerChannel>,
    /// Name of the inbox as returned by the broker
    pub inbox: String,
    /// Inbound deliveries from the inbox
    pub deliveries: DeliveryStream,
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("inbox", &self.inbox)
            .finish_non_exhaustive()
    }
}

/// Exchange options for the request exchange
pub fn request_exchange_options() -> ExchangeOptions {
    ExchangeOptions {
        durable: false,
        auto_delete: false,
    }
}

/// Queue options for the inbox
pub fn inbox_queue_options() -> QueueOptions {
    QueueOptions {
        exclusive: false,
        ..QueueOptions::default()
    }
}

/// Run every setup step against `connection`
pub async fn establish<C>(connection: &C, config: &MessagingConfig) -> Result<Topology, BrokerError>
where
    C: BrokerConnection,
{
    let response = connection
        .create_channel()
        .await
        .map_err(|e| BrokerError::topology(steps::RESPONSE_CHANNEL, &e))?;
    response
        .assert_exchange(
            &config.gateway,
            ExchangeKind::Direct,
            ExchangeOptions::default(),
        )
        .await
        .map_err(|e| BrokerError::topology(steps::GATEWAY_EXCHANGE, &e))?;
    debug!(gateway = %config.gateway, "Gateway exchange asserted");

    let request = connection
        .create_channel()
        .await
        .map_err(|e| BrokerError::topology(steps::REQUEST_CHANNEL, &e))?;
    request
        .assert_exchange(
            &config.request,
            ExchangeKind::Topic,
            request_exchange_options(),
        )
        .await
        .map_err(|e| BrokerError::topology(steps::REQUEST_EXCHANGE, &e))?;
    debug!(request = %config.request, "Request exchange asserted");

    let inbox = request
        .assert_queue(&config.inbox, inbox_queue_options())
        .await
        .map_err(|e| BrokerError::topology(steps::INBOX_QUEUE, &e))?;

    let topics = config.unique_topics();
    try_join_all(
        topics
            .iter()
            .map(|topic| request.bind_queue(&inbox, &config.request, topic)),
    )
    .await
    .map_err(|e| BrokerError::topology(steps::BIND_TOPICS, &e))?;
    debug!(inbox = %inbox, bindings = topics.len(), "Inbox bound");

    let deliveries = request
        .consume(&inbox, ConsumeOptions { no_ack: true })
        .await
        .map_err(|e| BrokerError::topology(steps::CONSUME, &e))?;

    info!(
        gateway = %config.gateway,
        request = %config.request,
        inbox = %inbox,
        topics = ?topics,
        "🔗 Broker topology established"
    );

    Ok(Topology {
        response: Arc::new(response),
        request: Arc::new(request),
        inbox,
        deliveries,
    })
}
