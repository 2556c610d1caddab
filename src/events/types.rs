//! Listener signatures for the broker handler's events.

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::messaging::errors::BrokerError;
use crate::messaging::message::IncomingMessage;
use crate::messaging::publisher::Replier;

/// Fired once when the handler first becomes ready
pub type ReadyListener = Box<dyn FnOnce() + Send>;

/// Receives every error event raised by the handler
pub type ErrorListener = Arc<dyn Fn(&BrokerError) + Send + Sync>;

/// Future returned by an intention listener
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Business handler for one intention group.
///
/// Each invocation receives its own copy of the message and a single-use
/// [`Replier`] correlated with it.
pub type IntentionListener = Arc<dyn Fn(IncomingMessage, Replier) -> HandlerFuture + Send + Sync>;
