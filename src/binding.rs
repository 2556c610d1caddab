//! # Venue Binding
//!
//! Connects a [`BrokerHandler`] to a [`VenueDatabase`]. Each CRUD intention is
//! executed against the database and answered with a [`VenueResponse`]:
//!
//! | Outcome | Status | Result |
//! |---|---|---|
//! | success | 200 | ids, or venues for `READ` |
//! | client-facing rejection | 405 | `[message]` |
//! | any other failure | 500 | `["internal server error"]` |
//! | unsupported intention | 501 | `[]` |
//!
//! `READ` requests whose routing key ends in `.discover` or `.delete` are
//! discovery requests and are answered with the discovery reply shapes.
//!
//! The outcome of every CRUD request is recorded in a [`RequestTracker`],
//! which keeps a rolling window of the most recent results.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::{DatabaseError, VenueDatabase};
use crate::events::Subscription;
use crate::messaging::{BrokerHandler, IncomingMessage, IntentionHandlers, Replier};
use crate::venue::{
    status, AssetType, DeleteVenueMessage, DiscoverResponse, DiscoveryDeleteResponse,
    DiscoveryKind, DiscoveryMessage, Envelope, IdFilter, ReadVenueMessage, VenueMessage,
    VenueResponse,
};

/// Number of recent outcomes the tracker remembers
pub const TRACKER_WINDOW: usize = 50;

/// Result body of a reply for an internal failure
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// General outcome of a handled request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Fail,
}

/// Outcome counts over the tracker window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HealthTraits {
    pub successful: usize,
    pub fail: usize,
}

/// Rolling window of the most recent request outcomes
#[derive(Debug)]
pub struct RequestTracker {
    window: Mutex<VecDeque<RequestOutcome>>,
    capacity: usize,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::with_capacity(TRACKER_WINDOW)
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Record an outcome, evicting the oldest one when the window is full
    pub fn record(&self, outcome: RequestOutcome) -> HealthTraits {
        let traits = {
            let mut window = self.window.lock();
            if window.len() >= self.capacity {
                window.pop_front();
            }
            window.push_back(outcome);
            Self::count(&window)
        };

        debug!(
            successful = traits.successful,
            fail = traits.fail,
            "🩺 Health traits updated"
        );
        traits
    }

    pub fn traits(&self) -> HealthTraits {
        Self::count(&self.window.lock())
    }

    pub fn len(&self) -> usize {
        self.window.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.lock().is_empty()
    }

    fn count(window: &VecDeque<RequestOutcome>) -> HealthTraits {
        let successful = window
            .iter()
            .filter(|outcome| **outcome == RequestOutcome::Success)
            .count();
        HealthTraits {
            successful,
            fail: window.len() - successful,
        }
    }
}

/// Intention handlers backed by a venue database
pub struct VenueBinding<D: VenueDatabase + ?Sized> {
    database: Arc<D>,
    tracker: Arc<RequestTracker>,
}

impl<D: VenueDatabase + ?Sized + 'static> VenueBinding<D> {
    pub fn new(database: Arc<D>, tracker: Arc<RequestTracker>) -> Self {
        Self { database, tracker }
    }

    pub fn tracker(&self) -> &Arc<RequestTracker> {
        &self.tracker
    }

    /// Run a CRUD request against the database and build its reply
    pub async fn execute(&self, message: &VenueMessage) -> VenueResponse {
        let envelope = message.envelope();
        let result = match message {
            VenueMessage::Create(create) => self.database.create(create).await.map(strings),
            VenueMessage::Read(read) => self.database.query(read).await.map(|venues| {
                venues
                    .into_iter()
                    .filter_map(|venue| serde_json::to_value(venue).ok())
                    .collect()
            }),
            VenueMessage::Update(update) => self.database.update(update).await.map(strings),
            VenueMessage::Delete(delete) => self.database.delete(delete).await.map(strings),
        };

        match result {
            Ok(result) => {
                self.tracker.record(RequestOutcome::Success);
                VenueResponse::new(envelope, status::SUCCESS, result)
            }
            Err(e) => {
                error!(
                    backend = self.database.backend_name(),
                    msg_id = envelope.msg_id,
                    intention = %envelope.msg_intention,
                    error = %e,
                    "❌ Venue operation failed"
                );
                self.tracker.record(RequestOutcome::Fail);
                error_response(envelope, &e)
            }
        }
    }

    /// Count the venues that depend on an asset
    pub async fn discover(&self, message: &DiscoveryMessage) -> Result<DiscoverResponse, DatabaseError> {
        let envelope = &message.envelope;
        let mut restrict = 0;
        let mut modify = 0;

        match message.asset_type {
            AssetType::User => {
                let venues = self
                    .database
                    .query(&ReadVenueMessage::all(envelope.clone()))
                    .await?;
                restrict = venues
                    .iter()
                    .filter(|venue| venue.user == message.asset_id)
                    .count();
            }
            AssetType::Venue => {
                let mut query = ReadVenueMessage::all(envelope.clone());
                query.id = Some(IdFilter::One(message.asset_id.clone()));
                modify = self.database.query(&query).await?.len();
            }
            AssetType::Other => {}
        }

        Ok(DiscoverResponse::new(envelope, restrict as i64, modify as i64))
    }

    /// Remove the venues that depend on an asset
    pub async fn remove_discovered(&self, message: &DiscoveryMessage) -> DiscoveryDeleteResponse {
        let envelope = &message.envelope;
        if message.asset_type != AssetType::Venue {
            return DiscoveryDeleteResponse::new(envelope, 0, true);
        }

        let delete = DeleteVenueMessage {
            envelope: Envelope::new(envelope.msg_id, "DELETE", "anonymous"),
            id: message.asset_id.clone(),
        };
        match self.database.delete(&delete).await {
            Ok(removed) => DiscoveryDeleteResponse::new(envelope, removed.len() as i64, true),
            Err(e) => {
                warn!(asset_id = %message.asset_id, error = %e, "⚠️ Discovery removal failed");
                DiscoveryDeleteResponse::new(envelope, 0, false)
            }
        }
    }

    async fn handle(&self, message: IncomingMessage, reply: Replier) -> anyhow::Result<()> {
        let decoded = match VenueMessage::from_incoming(&message) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return self.not_implemented(message, reply).await,
            Err(e) => {
                warn!(msg_id = %message.msg_id(), error = %e, "⚠️ Venue request did not decode");
                self.tracker.record(RequestOutcome::Fail);
                reply.send(internal_error_body(&message)).await;
                return Ok(());
            }
        };

        let response = self.execute(&decoded).await;
        reply.send(response.to_value()).await;
        Ok(())
    }

    async fn handle_discovery(
        &self,
        kind: DiscoveryKind,
        message: IncomingMessage,
        reply: Replier,
    ) -> anyhow::Result<()> {
        let request: DiscoveryMessage = match message.parse_as() {
            Ok(request) => request,
            Err(e) => {
                warn!(routing_key = message.routing_key(), error = %e, "⚠️ Discovery request did not decode");
                reply.send(internal_error_body(&message)).await;
                return Ok(());
            }
        };

        let body = match kind {
            DiscoveryKind::Discover => match self.discover(&request).await {
                Ok(response) => serde_json::to_value(response)?,
                Err(e) => {
                    error!(asset_id = %request.asset_id, error = %e, "❌ Discovery query failed");
                    error_response(&request.envelope, &e).to_value()
                }
            },
            DiscoveryKind::Remove => serde_json::to_value(self.remove_discovered(&request).await)?,
        };

        reply.send(body).await;
        Ok(())
    }

    async fn not_implemented(&self, message: IncomingMessage, reply: Replier) -> anyhow::Result<()> {
        info!(intention = %message.intention(), "Unsupported venue intention");
        self.tracker.record(RequestOutcome::Fail);

        let mut body = serde_json::Map::new();
        body.insert("msg_id".into(), message.msg_id().clone());
        body.insert(
            "msg_intention".into(),
            message.intention().as_wire().map_or(Value::Null, Value::from),
        );
        body.insert("status".into(), Value::from(status::NOT_IMPLEMENTED));
        body.insert(
            "userID".into(),
            message.field("userID").cloned().unwrap_or(Value::Null),
        );
        body.insert("result".into(), Value::Array(Vec::new()));

        reply.send(Value::Object(body)).await;
        Ok(())
    }
}

#[async_trait]
impl<D: VenueDatabase + ?Sized + 'static> IntentionHandlers for VenueBinding<D> {
    async fn on_create(&self, message: IncomingMessage, reply: Replier) -> anyhow::Result<()> {
        self.handle(message, reply).await
    }

    async fn on_read(&self, message: IncomingMessage, reply: Replier) -> anyhow::Result<()> {
        match DiscoveryKind::from_routing_key(message.routing_key()) {
            Some(kind) => self.handle_discovery(kind, message, reply).await,
            None => self.handle(message, reply).await,
        }
    }

    async fn on_update(&self, message: IncomingMessage, reply: Replier) -> anyhow::Result<()> {
        self.handle(message, reply).await
    }

    async fn on_delete(&self, message: IncomingMessage, reply: Replier) -> anyhow::Result<()> {
        self.handle(message, reply).await
    }

    async fn on_other(&self, message: IncomingMessage, reply: Replier) -> anyhow::Result<()> {
        self.not_implemented(message, reply).await
    }
}

/// Register the venue handlers on a broker handler
pub fn bind<D>(
    database: Arc<D>,
    broker: &BrokerHandler,
    tracker: Arc<RequestTracker>,
) -> Vec<Subscription>
where
    D: VenueDatabase + ?Sized + 'static,
{
    let backend = database.backend_name().to_string();
    let subscriptions = broker.bind_handlers(Arc::new(VenueBinding::new(database, tracker)));
    info!(backend = %backend, handlers = subscriptions.len(), "🔗 Venue handlers bound");
    subscriptions
}

fn strings(ids: Vec<String>) -> Vec<Value> {
    ids.into_iter().map(Value::from).collect()
}

fn error_response(envelope: &Envelope, error: &DatabaseError) -> VenueResponse {
    if error.is_client_facing() {
        VenueResponse::strings(envelope, status::FAIL, vec![error.to_string()])
    } else {
        VenueResponse::strings(
            envelope,
            status::INTERNAL_SERVER_ERROR,
            vec![INTERNAL_ERROR_MESSAGE.to_string()],
        )
    }
}

fn internal_error_body(message: &IncomingMessage) -> Value {
    serde_json::json!({
        "msg_id": message.msg_id(),
        "msg_intention": message.intention().as_wire(),
        "status": status::INTERNAL_SERVER_ERROR,
        "userID": message.field("userID").cloned().unwrap_or(Value::Null),
        "result": [INTERNAL_ERROR_MESSAGE],
    })
}
