//! # Dispatch Router
//!
//! Routes a decoded [`IncomingMessage`] to the listeners registered for its
//! intention group. Each listener runs as its own detached task under a small
//! supervisor: an `Err` result or a panic is logged and turned into exactly one
//! [`BrokerError::HandlerFailed`] event. The router returns as soon as the
//! tasks are spawned, so the consume loop never waits on business logic.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::errors::BrokerError;
use super::message::{IncomingMessage, IntentionKind};
use super::publisher::{Replier, ReplyPublisher};
use crate::events::{EventRegistry, HandlerFuture, IntentionListener};

/// Object-style handler for every intention group.
///
/// Default methods do nothing; implement the ones the service supports and
/// register the object with
/// [`BrokerHandler::bind_handlers`](super::handler::BrokerHandler::bind_handlers).
#[async_trait]
pub trait IntentionHandlers: Send + Sync + 'static {
    async fn on_create(&self, _message: IncomingMessage, _reply: Replier) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_read(&self, _message: IncomingMessage, _reply: Replier) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_update(&self, _message: IncomingMessage, _reply: Replier) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_delete(&self, _message: IncomingMessage, _reply: Replier) -> anyhow::Result<()> {
        Ok(())
    }

    /// Catch-all for unrecognised or missing intentions
    async fn on_other(&self, _message: IncomingMessage, _reply: Replier) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Wrap one method of an [`IntentionHandlers`] object as a listener
pub fn handlers_listener<H>(handlers: Arc<H>, kind: IntentionKind) -> IntentionListener
where
    H: IntentionHandlers,
{
    Arc::new(move |message: IncomingMessage, reply: Replier| -> HandlerFuture {
        let handlers = handlers.clone();
        Box::pin(async move {
            match kind {
                IntentionKind::Create => handlers.on_create(message, reply).await,
                IntentionKind::Read => handlers.on_read(message, reply).await,
                IntentionKind::Update => handlers.on_update(message, reply).await,
                IntentionKind::Delete => handlers.on_delete(message, reply).await,
                IntentionKind::Other => handlers.on_other(message, reply).await,
            }
        })
    })
}

/// Selects listeners by intention and supervises their tasks
pub struct Router {
    registry: Arc<EventRegistry>,
    publisher: Arc<ReplyPublisher>,
}

impl Router {
    pub fn new(registry: Arc<EventRegistry>, publisher: Arc<ReplyPublisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Spawn one supervised task per listener of the message's intention group.
    ///
    /// Returns the handles of the spawned tasks; the router itself never awaits them.
    pub fn dispatch(&self, message: IncomingMessage) -> Vec<JoinHandle<()>> {
        let kind = message.intention().kind();
        let listeners = self.registry.intention(kind).select_for_emit();

        if listeners.is_empty() {
            debug!(
                msg_id = %message.msg_id(),
                intention = %message.intention(),
                group = %kind,
                "No listeners for intention, message ignored"
            );
            return Vec::new();
        }

        debug!(
            msg_id = %message.msg_id(),
            intention = %message.intention(),
            group = %kind,
            listeners = listeners.len(),
            "📨 Dispatching message"
        );

        listeners
            .into_iter()
            .map(|listener| {
                let replier = Replier::new(
                    self.publisher.clone(),
                    message.msg_id().clone(),
                    message.intention().as_wire().map(str::to_string),
                );
                self.spawn_supervised(listener, message.clone(), replier)
            })
            .collect()
    }

    fn spawn_supervised(
        &self,
        listener: IntentionListener,
        message: IncomingMessage,
        replier: Replier,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let intention = message.intention().to_string();
        let msg_id = message.msg_id().clone();

        tokio::spawn(async move {
            // The listener call itself sits inside the guarded future so a panic
            // before its first await is caught too
            let outcome = AssertUnwindSafe(async move { listener(message, replier).await })
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => panic_message(panic.as_ref()),
            };

            error!(
                msg_id = %msg_id,
                intention = %intention,
                error = %failure,
                "❌ Intention handler failed"
            );
            registry.emit_error(&BrokerError::handler_failed(intention, failure));
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
