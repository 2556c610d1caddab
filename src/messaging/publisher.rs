//! # Reply Publisher
//!
//! Publishes replies to the gateway exchange. Every reply is checked by the
//! outgoing validator first; a reply that fails validation (or whose validator
//! errors) is replaced by the correlated fallback envelope
//! `{msg_id, msg_intention, status: 500}`, so a requester whose message reached
//! a handler always gets something back that it can correlate.
//!
//! Nothing here raises to the caller. A missing response channel or a failed
//! publish is logged and reported through [`ReplyOutcome`].

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::codec;
use super::message::fallback_envelope;
use super::transport::BrokerChannel;
use super::validator::{is_valid, SharedValidator};

/// What happened to a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The reply body was published as given
    Published,
    /// The body failed outgoing validation; the fallback envelope was published
    Fallback,
    /// No response channel was available; nothing was published
    NoChannel,
    /// Encoding or publishing failed; nothing reached the broker
    Failed,
}

/// Validates and publishes replies to the gateway exchange
pub struct ReplyPublisher {
    gateway: String,
    validator: SharedValidator,
    channel: RwLock<Option<Arc<dyn BrokerChannel>>>,
}

impl std::fmt::Debug for ReplyPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyPublisher")
            .field("gateway", &self.gateway)
            .field("validator", &self.validator.validator_name())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ReplyPublisher {
    pub fn new(gateway: impl Into<String>, validator: SharedValidator) -> Self {
        Self {
            gateway: gateway.into(),
            validator,
            channel: RwLock::new(None),
        }
    }

    /// Use `channel` as the response channel from now on
    pub fn attach(&self, channel: Arc<dyn BrokerChannel>) {
        *self.channel.write() = Some(channel);
    }

    /// Drop the response channel; later replies are logged and discarded
    pub fn detach(&self) {
        *self.channel.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.channel.read().is_some()
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Validate `body` and publish it, or the fallback envelope, to the gateway
    pub async fn send(
        &self,
        msg_id: impl Into<Value>,
        msg_intention: Option<&str>,
        body: Value,
    ) -> ReplyOutcome {
        let msg_id = msg_id.into();
        let Some(channel) = self.channel.read().clone() else {
            warn!(
                msg_id = %msg_id,
                msg_intention = ?msg_intention,
                "⚠️ No response channel, dropping reply"
            );
            return ReplyOutcome::NoChannel;
        };

        let (payload, outcome) = if is_valid(self.validator.as_ref(), &body).await {
            (body, ReplyOutcome::Published)
        } else {
            warn!(
                msg_id = %msg_id,
                msg_intention = ?msg_intention,
                validator = self.validator.validator_name(),
                "⚠️ Reply failed outgoing validation, publishing fallback"
            );
            (
                fallback_envelope(&msg_id, msg_intention),
                ReplyOutcome::Fallback,
            )
        };

        let bytes = match codec::encode(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(msg_id = %msg_id, error = %e, "❌ Failed to encode reply");
                return ReplyOutcome::Failed;
            }
        };

        match channel.publish(&self.gateway, "", bytes).await {
            Ok(()) => {
                debug!(
                    msg_id = %msg_id,
                    msg_intention = ?msg_intention,
                    gateway = %self.gateway,
                    fallback = outcome == ReplyOutcome::Fallback,
                    "📤 Reply published"
                );
                outcome
            }
            Err(e) => {
                error!(
                    msg_id = %msg_id,
                    gateway = %self.gateway,
                    error = %e,
                    "❌ Failed to publish reply"
                );
                ReplyOutcome::Failed
            }
        }
    }
}

/// Single-use reply handle bound to one inbound envelope.
///
/// `send` consumes the handle, so a listener can reply at most once.
pub struct Replier {
    publisher: Arc<ReplyPublisher>,
    msg_id: Value,
    msg_intention: Option<String>,
}

impl std::fmt::Debug for Replier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replier")
            .field("msg_id", &self.msg_id)
            .field("msg_intention", &self.msg_intention)
            .finish()
    }
}

impl Replier {
    pub fn new(
        publisher: Arc<ReplyPublisher>,
        msg_id: Value,
        msg_intention: Option<String>,
    ) -> Self {
        Self {
            publisher,
            msg_id,
            msg_intention,
        }
    }

    pub fn msg_id(&self) -> &Value {
        &self.msg_id
    }

    pub fn msg_intention(&self) -> Option<&str> {
        self.msg_intention.as_deref()
    }

    /// Publish the reply for this envelope
    pub async fn send(self, body: Value) -> ReplyOutcome {
        self.publisher
            .send(self.msg_id, self.msg_intention.as_deref(), body)
            .await
    }
}
