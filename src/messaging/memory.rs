//! # In-Memory Broker
//!
//! A process-local broker implementing the transport traits with AMQP routing
//! semantics (direct, topic and fanout exchanges). The test-suite runs the
//! whole handler against it; it also exposes hooks to inspect published
//! messages and to inject connection errors, closes and setup failures.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use venue_service::messaging::memory::MemoryBroker;
//!
//! let broker = MemoryBroker::new();
//! let mut replies = broker.subscribe_published();
//! broker.publish("request", "venues.details.create", br#"{"msg_intention":"CREATE"}"#.to_vec())?;
//! let reply = replies.recv().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::errors::{ConnectError, MessagingError, MessagingResult};
use super::transport::{
    BrokerChannel, BrokerConnection, ConnectionEvent, ConnectionListener, ConsumeOptions,
    Connector, Delivery, DeliveryStream, ExchangeKind, ExchangeOptions, QueueOptions,
};
use crate::config::ConnectOptions;

/// How the next connect attempts fail
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectFault {
    /// Reject with an error value
    Error(MessagingError),
    /// Reject without an error value
    Unknown,
    /// Panic inside the connect future
    Panic,
}

/// Whether a topic pattern matches a routing key.
///
/// Words are dot-separated; `*` matches exactly one word and `#` matches zero
/// or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    fn words(s: &str) -> Vec<&str> {
        if s.is_empty() {
            Vec::new()
        } else {
            s.split('.').collect()
        }
    }

    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match pattern.split_first() {
            None => key.is_empty(),
            Some((&"#", rest)) => (0..=key.len()).any(|skip| matches(rest, &key[skip..])),
            Some((&"*", rest)) => !key.is_empty() && matches(rest, &key[1..]),
            Some((word, rest)) => key.first() == Some(word) && matches(rest, &key[1..]),
        }
    }

    matches(&words(pattern), &words(routing_key))
}

#[derive(Debug, Clone)]
struct ExchangeState {
    kind: ExchangeKind,
    options: ExchangeOptions,
}

#[derive(Debug, Clone)]
struct Binding {
    queue: String,
    exchange: String,
    pattern: String,
}

struct Consumer {
    connection_id: u64,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct QueueState {
    options: QueueOptions,
    owner: Option<u64>,
    consumers: Vec<Consumer>,
    backlog: Vec<Delivery>,
    next_consumer: usize,
}

struct ConnectionShared {
    id: u64,
    closed: AtomicBool,
    listeners: Mutex<Vec<ConnectionListener>>,
}

impl ConnectionShared {
    fn notify(&self, event: ConnectionEvent) {
        for listener in self.listeners.lock().iter() {
            listener(event.clone());
        }
    }
}

struct BrokerState {
    exchanges: DashMap<String, ExchangeState>,
    queues: DashMap<String, QueueState>,
    bindings: Mutex<Vec<Binding>>,
    published: Mutex<Vec<Delivery>>,
    published_tx: broadcast::Sender<Delivery>,
    connections: Mutex<Vec<Arc<ConnectionShared>>>,
    connect_fault: Mutex<Option<ConnectFault>>,
    failing_operations: Mutex<HashSet<String>>,
    next_connection_id: AtomicU64,
    connect_attempts: AtomicUsize,
}

/// Process-local broker; clones share the same state
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("exchanges", &self.state.exchanges.len())
            .field("queues", &self.state.queues.len())
            .field("connections", &self.state.connections.lock().len())
            .finish()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (published_tx, _) = broadcast::channel(1024);
        Self {
            state: Arc::new(BrokerState {
                exchanges: DashMap::new(),
                queues: DashMap::new(),
                bindings: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                published_tx,
                connections: Mutex::new(Vec::new()),
                connect_fault: Mutex::new(None),
                failing_operations: Mutex::new(HashSet::new()),
                next_connection_id: AtomicU64::new(1),
                connect_attempts: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish from outside any connection, as another service would
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Bytes>,
    ) -> MessagingResult<()> {
        self.route(exchange, routing_key, payload.into())
    }

    /// Every message published to `exchange` so far, in publish order
    pub fn published_to(&self, exchange: &str) -> Vec<Delivery> {
        self.state
            .published
            .lock()
            .iter()
            .filter(|delivery| delivery.exchange == exchange)
            .cloned()
            .collect()
    }

    /// Receive every message published from now on
    pub fn subscribe_published(&self) -> broadcast::Receiver<Delivery> {
        self.state.published_tx.subscribe()
    }

    pub fn exchange_kind(&self, name: &str) -> Option<ExchangeKind> {
        self.state.exchanges.get(name).map(|e| e.kind)
    }

    pub fn exchange_options(&self, name: &str) -> Option<ExchangeOptions> {
        self.state.exchanges.get(name).map(|e| e.options)
    }

    pub fn queue_options(&self, name: &str) -> Option<QueueOptions> {
        self.state.queues.get(name).map(|q| q.options)
    }

    /// `(exchange, pattern)` bindings of a queue, in bind order
    pub fn bindings(&self, queue: &str) -> Vec<(String, String)> {
        self.state
            .bindings
            .lock()
            .iter()
            .filter(|binding| binding.queue == queue)
            .map(|binding| (binding.exchange.clone(), binding.pattern.clone()))
            .collect()
    }

    pub fn consumer_count(&self, queue: &str) -> usize {
        self.state
            .queues
            .get(queue)
            .map(|q| q.consumers.len())
            .unwrap_or(0)
    }

    /// Messages routed to a queue that had no consumer
    pub fn backlog(&self, queue: &str) -> Vec<Delivery> {
        self.state
            .queues
            .get(queue)
            .map(|q| q.backlog.clone())
            .unwrap_or_default()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Make every later connect attempt fail; `None` restores normal behaviour
    pub fn set_connect_fault(&self, fault: Option<ConnectFault>) {
        *self.state.connect_fault.lock() = fault;
    }

    /// Make a channel or connection operation fail from now on.
    ///
    /// Names: `create_channel`, `assert_exchange`, `assert_queue`, `bind_queue`,
    /// `consume`, `publish`.
    pub fn fail_operation(&self, operation: &str) {
        self.state
            .failing_operations
            .lock()
            .insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.failing_operations.lock().clear();
    }

    /// Raise an error event on every open connection
    pub fn raise_error(&self, message: &str) {
        let connections = self.state.connections.lock().clone();
        for connection in connections.iter().filter(|c| !c.closed.load(Ordering::SeqCst)) {
            connection.notify(ConnectionEvent::Error(message.to_string()));
        }
    }

    /// Close every open connection: consumers are cancelled and close events fire
    pub fn close_connections(&self) {
        let connections: Vec<Arc<ConnectionShared>> =
            self.state.connections.lock().drain(..).collect();

        for connection in connections {
            if connection.closed.swap(true, Ordering::SeqCst) {
                continue;
            }
            self.drop_consumers(connection.id);
            debug!(connection_id = connection.id, "Memory broker closing connection");
            connection.notify(ConnectionEvent::Closed);
        }
    }

    fn drop_consumers(&self, connection_id: u64) {
        for mut queue in self.state.queues.iter_mut() {
            queue
                .consumers
                .retain(|consumer| consumer.connection_id != connection_id);
        }
    }

    fn check_operation(&self, operation: &str) -> MessagingResult<()> {
        if self.state.failing_operations.lock().contains(operation) {
            return Err(MessagingError::channel_operation(
                operation,
                "injected failure",
            ));
        }
        Ok(())
    }

    fn route(&self, exchange: &str, routing_key: &str, payload: Bytes) -> MessagingResult<()> {
        let kind = self
            .exchange_kind(exchange)
            .ok_or_else(|| MessagingError::exchange_not_found(exchange))?;

        let delivery = Delivery::new(exchange, routing_key, payload);
        self.state.published.lock().push(delivery.clone());
        // No subscribers is fine
        let _ = self.state.published_tx.send(delivery.clone());

        let mut targets: Vec<String> = Vec::new();
        for binding in self.state.bindings.lock().iter() {
            if binding.exchange != exchange || targets.contains(&binding.queue) {
                continue;
            }
            let routed = match kind {
                ExchangeKind::Direct => binding.pattern == routing_key,
                ExchangeKind::Topic => topic_matches(&binding.pattern, routing_key),
                ExchangeKind::Fanout => true,
            };
            if routed {
                targets.push(binding.queue.clone());
            }
        }

        trace!(
            exchange = exchange,
            routing_key = routing_key,
            queues = ?targets,
            "Memory broker routed message"
        );

        for queue in targets {
            if let Some(mut state) = self.state.queues.get_mut(&queue) {
                Self::enqueue(&mut state, delivery.clone());
            }
        }
        Ok(())
    }

    fn enqueue(queue: &mut QueueState, delivery: Delivery) {
        while !queue.consumers.is_empty() {
            let index = queue.next_consumer % queue.consumers.len();
            queue.next_consumer = queue.next_consumer.wrapping_add(1);
            if queue.consumers[index]
                .sender
                .unbounded_send(delivery.clone())
                .is_ok()
            {
                return;
            }
            // Receiver gone; forget the consumer and try the next one
            queue.consumers.remove(index);
        }
        queue.backlog.push(delivery);
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    type Connection = MemoryConnection;

    async fn connect(&self, _options: &ConnectOptions) -> Result<MemoryConnection, ConnectError> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let fault = self.state.connect_fault.lock().clone();
        match fault {
            Some(ConnectFault::Error(e)) => return Err(ConnectError::Failed(e)),
            Some(ConnectFault::Unknown) => return Err(ConnectError::Unknown),
            Some(ConnectFault::Panic) => panic!("memory broker connect fault"),
            None => {}
        }

        let shared = Arc::new(ConnectionShared {
            id: self.state.next_connection_id.fetch_add(1, Ordering::SeqCst),
            closed: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        });
        self.state.connections.lock().push(shared.clone());

        debug!(connection_id = shared.id, "Memory broker accepted connection");
        Ok(MemoryConnection {
            broker: self.clone(),
            shared,
        })
    }
}

/// Connection to a [`MemoryBroker`]
pub struct MemoryConnection {
    broker: MemoryBroker,
    shared: Arc<ConnectionShared>,
}

impl MemoryConnection {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    type Channel = MemoryChannel;

    async fn create_channel(&self) -> MessagingResult<MemoryChannel> {
        if self.is_closed() {
            return Err(MessagingError::connection("connection is closed"));
        }
        self.broker.check_operation("create_channel")?;
        Ok(MemoryChannel {
            broker: self.broker.clone(),
            shared: self.shared.clone(),
        })
    }

    fn on_event(&self, listener: ConnectionListener) {
        self.shared.listeners.lock().push(listener);
    }
}

/// Channel on a [`MemoryConnection`]
pub struct MemoryChannel {
    broker: MemoryBroker,
    shared: Arc<ConnectionShared>,
}

impl MemoryChannel {
    fn ensure_open(&self, operation: &str) -> MessagingResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::connection("connection is closed"));
        }
        self.broker.check_operation(operation)
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> MessagingResult<()> {
        self.ensure_open("assert_exchange")?;

        let existing = self
            .broker
            .state
            .exchanges
            .entry(name.to_string())
            .or_insert(ExchangeState { kind, options })
            .clone();

        if existing.kind != kind {
            return Err(MessagingError::channel_operation(
                "assert_exchange",
                format!(
                    "PRECONDITION_FAILED - inequivalent arg 'type' for exchange '{name}': received '{kind}' but current is '{}'",
                    existing.kind
                ),
            ));
        }
        Ok(())
    }

    async fn assert_queue(&self, name: &str, options: QueueOptions) -> MessagingResult<String> {
        self.ensure_open("assert_queue")?;

        let connection_id = self.shared.id;
        let mut queue = self
            .broker
            .state
            .queues
            .entry(name.to_string())
            .or_insert_with(|| QueueState {
                options,
                owner: options.exclusive.then_some(connection_id),
                ..QueueState::default()
            });

        if let Some(owner) = queue.owner {
            if owner != connection_id {
                return Err(MessagingError::channel_operation(
                    "assert_queue",
                    format!("RESOURCE_LOCKED - queue '{name}' is exclusive to another connection"),
                ));
            }
        }
        if options.exclusive && queue.owner.is_none() {
            queue.owner = Some(connection_id);
        }

        Ok(name.to_string())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> MessagingResult<()> {
        self.ensure_open("bind_queue")?;

        if !self.broker.state.queues.contains_key(queue) {
            return Err(MessagingError::queue_not_found(queue));
        }
        if !self.broker.state.exchanges.contains_key(exchange) {
            return Err(MessagingError::exchange_not_found(exchange));
        }

        let mut bindings = self.broker.state.bindings.lock();
        let exists = bindings.iter().any(|binding| {
            binding.queue == queue && binding.exchange == exchange && binding.pattern == pattern
        });
        if !exists {
            bindings.push(Binding {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                pattern: pattern.to_string(),
            });
        }
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        _options: ConsumeOptions,
    ) -> MessagingResult<DeliveryStream> {
        self.ensure_open("consume")?;

        let mut state = self
            .broker
            .state
            .queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::queue_not_found(queue))?;

        let (sender, receiver) = mpsc::unbounded();
        for delivery in state.backlog.drain(..) {
            // The receiver is alive; it was created just above
            let _ = sender.unbounded_send(delivery);
        }
        state.consumers.push(Consumer {
            connection_id: self.shared.id,
            sender,
        });

        Ok(receiver.boxed())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> MessagingResult<()> {
        self.ensure_open("publish")?;
        self.broker.route(exchange, routing_key, payload)
    }
}
