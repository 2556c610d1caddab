//! # Broker Handler
//!
//! The request/reply endpoint a service talks to. A handler owns one broker
//! connection and runs its whole lifecycle on a background task:
//!
//! 1. connect through the injected [`Connector`];
//! 2. register connection error/close listeners;
//! 3. build the topology (see [`super::topology`]);
//! 4. attach the reply publisher, flip the readiness gate and fire queued
//!    ready callbacks;
//! 5. consume the inbox until the broker cancels the consumer.
//!
//! Every inbound delivery is parsed, checked by the incoming validator,
//! decoded into an [`IncomingMessage`] and handed to the router. Undecodable
//! or invalid messages, including those whose validator panics, are logged and
//! dropped. A connection error or close takes the handler out of ready.
//! Failures anywhere in the lifecycle surface as `error` events; nothing here
//! panics or exits the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use venue_service::config::MessagingConfig;
//! use venue_service::messaging::{AmqpConnector, BrokerHandler, IntentionKind};
//! use venue_service::messaging::validator::AcceptAll;
//!
//! # async fn demo() {
//! let config = MessagingConfig::new("gateway", "request", "venues", vec!["venues.#".into()]);
//! let handler = BrokerHandler::new(config, Arc::new(AcceptAll), Arc::new(AcceptAll));
//!
//! handler.on_error(|e| eprintln!("broker error: {e}"));
//! handler.on(IntentionKind::Create, |message, reply| async move {
//!     reply
//!         .send(json!({"msg_id": message.msg_id(), "msg_intention": "CREATE", "status": 200}))
//!         .await;
//!     Ok(())
//! });
//! handler.on_ready(|| println!("ready"));
//!
//! handler.start(AmqpConnector);
//! # }
//! ```

use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec;
use super::errors::BrokerError;
use super::message::{IncomingMessage, IntentionKind, Validated};
use super::publisher::{Replier, ReplyOutcome, ReplyPublisher};
use super::router::{handlers_listener, IntentionHandlers, Router};
use super::topology::{self, Topology};
use super::transport::{BrokerConnection, ConnectionEvent, Connector, Delivery};
use super::validator::{is_valid, SharedValidator};
use crate::config::MessagingConfig;
use crate::events::{EventRegistry, HandlerFuture, IntentionListener, Subscription};
use crate::state_machine::{ConnectionState, LifecycleEvent, ReadinessGate};

struct HandlerInner {
    config: MessagingConfig,
    incoming: SharedValidator,
    gate: ReadinessGate,
    registry: Arc<EventRegistry>,
    publisher: Arc<ReplyPublisher>,
    router: Router,
    connected: AtomicBool,
    last_error: Mutex<Option<BrokerError>>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

/// Broker request/reply endpoint
#[derive(Clone)]
pub struct BrokerHandler {
    inner: Arc<HandlerInner>,
}

impl std::fmt::Debug for BrokerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerHandler")
            .field("inbox", &self.inner.config.inbox)
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl BrokerHandler {
    /// Create a handler without connecting.
    ///
    /// Register listeners, then call [`start`](Self::start).
    pub fn new(
        config: MessagingConfig,
        incoming: SharedValidator,
        outgoing: SharedValidator,
    ) -> Self {
        let registry = Arc::new(EventRegistry::new());
        let publisher = Arc::new(ReplyPublisher::new(config.gateway.clone(), outgoing));
        let router = Router::new(registry.clone(), publisher.clone());

        Self {
            inner: Arc::new(HandlerInner {
                config,
                incoming,
                gate: ReadinessGate::new(),
                registry,
                publisher,
                router,
                connected: AtomicBool::new(false),
                last_error: Mutex::new(None),
                lifecycle: Mutex::new(None),
            }),
        }
    }

    /// Create a handler and start connecting immediately
    pub fn connect<C: Connector>(
        config: MessagingConfig,
        incoming: SharedValidator,
        outgoing: SharedValidator,
        connector: C,
    ) -> Self {
        let handler = Self::new(config, incoming, outgoing);
        handler.start(connector);
        handler
    }

    /// Spawn the connection lifecycle on the current tokio runtime.
    ///
    /// Returns `false` if the handler was already started.
    pub fn start<C: Connector>(&self, connector: C) -> bool {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.is_some() {
            warn!(inbox = %self.inner.config.inbox, "⚠️ Broker handler already started");
            return false;
        }

        let inner = self.inner.clone();
        *lifecycle = Some(tokio::spawn(async move {
            HandlerInner::run(inner, connector).await;
        }));
        true
    }

    /// Stop consuming and drop the connection
    pub fn shutdown(&self) {
        if let Some(task) = self.inner.lifecycle.lock().take() {
            task.abort();
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.publisher.detach();
        self.inner.gate.apply(LifecycleEvent::ConnectionLost);
        info!(inbox = %self.inner.config.inbox, "🛑 Broker handler shut down");
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.gate.state()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_ready()
    }

    /// Whether the connection is established and the topology is in place
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// The most recent fatal error, if any
    pub fn last_error(&self) -> Option<BrokerError> {
        self.inner.last_error.lock().clone()
    }

    /// Run `callback` once the handler is ready; immediately if it already is
    pub fn on_ready<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        let ready = self.inner.registry.ready().clone();
        let subscription = ready.add_once(Box::new(callback));
        let id = subscription.id();

        let registry_ready = ready.clone();
        let accepted = self.inner.gate.on_ready(Box::new(move || {
            // Unsubscribed callbacks are gone from the set
            if let Some(callback) = ready.take(id) {
                callback();
            }
        }));
        if !accepted {
            registry_ready.take(id);
        }
        subscription
    }

    /// Same as [`on_ready`](Self::on_ready); ready is reached at most once
    pub fn once_ready<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_ready(callback)
    }

    /// Receive every error event
    pub fn on_error<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BrokerError) + Send + Sync + 'static,
    {
        self.inner.registry.error().add(Arc::new(listener))
    }

    /// Receive the next error event only
    pub fn once_error<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BrokerError) + Send + Sync + 'static,
    {
        self.inner.registry.error().add_once(Arc::new(listener))
    }

    /// Register a persistent listener for an intention group
    pub fn on<F, Fut>(&self, kind: IntentionKind, listener: F) -> Subscription
    where
        F: Fn(IncomingMessage, Replier) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.registry.intention(kind).add(boxed_listener(listener))
    }

    /// Register a listener invoked for the first matching message only
    pub fn once<F, Fut>(&self, kind: IntentionKind, listener: F) -> Subscription
    where
        F: Fn(IncomingMessage, Replier) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner
            .registry
            .intention(kind)
            .add_once(boxed_listener(listener))
    }

    /// Register every method of an [`IntentionHandlers`] object
    pub fn bind_handlers<H: IntentionHandlers>(&self, handlers: Arc<H>) -> Vec<Subscription> {
        IntentionKind::ALL
            .iter()
            .map(|kind| {
                self.inner
                    .registry
                    .intention(*kind)
                    .add(handlers_listener(handlers.clone(), *kind))
            })
            .collect()
    }

    /// Publish a reply outside of a listener
    pub async fn send(
        &self,
        msg_id: impl Into<Value>,
        msg_intention: Option<&str>,
        body: Value,
    ) -> ReplyOutcome {
        self.inner.publisher.send(msg_id, msg_intention, body).await
    }

    /// Wait until the handler is ready, or fails to get there
    pub async fn wait_until_ready(&self) -> Result<(), BrokerError> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let on_error = tx.clone();
        let error_subscription = self.on_error(move |e| {
            if e.is_fatal() {
                if let Some(tx) = on_error.lock().take() {
                    let _ = tx.send(Err(e.clone()));
                }
            }
        });
        let on_ready = tx.clone();
        let ready_subscription = self.on_ready(move || {
            if let Some(tx) = on_ready.lock().take() {
                let _ = tx.send(Ok(()));
            }
        });

        // Failures that happened before the listeners were in place
        let state = self.state();
        let lost = state == ConnectionState::Disconnected && self.inner.gate.has_been_ready();
        if state.is_terminal() || lost {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(Err(self.last_error().unwrap_or(BrokerError::Disconnected)));
            }
        }

        let result = rx.await.unwrap_or(Err(BrokerError::Disconnected));
        error_subscription.unsubscribe();
        ready_subscription.unsubscribe();
        result
    }
}

fn boxed_listener<F, Fut>(listener: F) -> IntentionListener
where
    F: Fn(IncomingMessage, Replier) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |message: IncomingMessage, reply: Replier| -> HandlerFuture {
        listener(message, reply).boxed()
    })
}

impl HandlerInner {
    async fn run<C: Connector>(inner: Arc<HandlerInner>, connector: C) {
        inner.gate.apply(LifecycleEvent::Connect);
        debug!(broker = %inner.config.options.redacted_uri(), "Broker handler connecting");

        let connection = match AssertUnwindSafe(connector.connect(&inner.config.options))
            .catch_unwind()
            .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                inner.fail_setup(e.into());
                return;
            }
            Err(_) => {
                error!("❌ Broker connector panicked");
                inner.fail_setup(BrokerError::UnknownConnect);
                return;
            }
        };

        connection.on_event(connection_listener(Arc::downgrade(&inner)));

        let Topology {
            response,
            request: _request_channel,
            inbox,
            mut deliveries,
        } = match topology::establish(&connection, &inner.config).await {
            Ok(topology) => topology,
            Err(e) => {
                inner.fail_setup(e);
                return;
            }
        };

        inner.publisher.attach(response);
        inner.connected.store(true, Ordering::SeqCst);
        info!(inbox = %inbox, "✅ Broker handler ready");
        inner.gate.mark_ready();

        while let Some(delivery) = deliveries.next().await {
            inner.handle_delivery(delivery).await;
        }

        warn!(inbox = %inbox, "⚠️ Consumer cancelled by the broker");
        drop(connection);
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let value = match codec::parse(&delivery.payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    routing_key = %delivery.routing_key,
                    bytes = delivery.payload.len(),
                    error = %e,
                    "⚠️ Dropping undecodable message"
                );
                return;
            }
        };

        if !is_valid(self.incoming.as_ref(), &value).await {
            warn!(
                routing_key = %delivery.routing_key,
                validator = self.incoming.validator_name(),
                "⚠️ Dropping message that failed incoming validation"
            );
            return;
        }

        let message = IncomingMessage::decode(Validated::new(value), delivery.routing_key);
        self.router.dispatch(message);
    }

    fn fail_setup(&self, err: BrokerError) {
        self.gate.apply(LifecycleEvent::SetupFailed);
        self.connected.store(false, Ordering::SeqCst);
        error!(error = %err, "❌ Broker handler setup failed");
        *self.last_error.lock() = Some(err.clone());
        self.registry.emit_error(&err);
    }

    /// Leave the ready state after a connection error or close, then report `cause`
    fn connection_lost(&self, cause: BrokerError) {
        self.connected.store(false, Ordering::SeqCst);
        self.publisher.detach();
        if self.gate.apply(LifecycleEvent::ConnectionLost).is_some() {
            warn!(inbox = %self.config.inbox, "⚠️ Disconnected from the message broker");
        }
        *self.last_error.lock() = Some(cause.clone());
        self.registry.emit_error(&cause);
    }
}

fn connection_listener(inner: Weak<HandlerInner>) -> Box<dyn Fn(ConnectionEvent) + Send + Sync> {
    Box::new(move |event: ConnectionEvent| {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match event {
            ConnectionEvent::Error(message) => {
                error!(error = %message, "❌ Broker connection error");
                inner.connection_lost(BrokerError::connection(message));
            }
            ConnectionEvent::Closed => inner.connection_lost(BrokerError::Disconnected),
        }
    })
}
