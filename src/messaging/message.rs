//! # Message Structures for the Broker Protocol
//!
//! Envelopes are JSON objects carrying a correlation id (`msg_id`) and an
//! intention tag (`msg_intention`). Everything else in the object is payload
//! that the protocol layer never interprets.
//!
//! Raw JSON only becomes an [`IncomingMessage`] through [`IncomingMessage::decode`],
//! which takes a [`Validated`] value. That keeps unvalidated shapes from
//! reaching dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field carrying the correlation id
pub const MSG_ID_FIELD: &str = "msg_id";

/// Field carrying the intention tag
pub const MSG_INTENTION_FIELD: &str = "msg_intention";

/// Field carrying the outbound status code
pub const STATUS_FIELD: &str = "status";

/// Status code carried by the fallback reply
pub const FALLBACK_STATUS: i64 = 500;

/// The operation kind declared by an inbound envelope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intention {
    Create,
    Read,
    Update,
    Delete,
    /// Unrecognised intention, or `None` when the field was absent or not a string
    Other(Option<String>),
}

impl Intention {
    /// Parse the wire representation of an intention
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("CREATE") => Self::Create,
            Some("READ") => Self::Read,
            Some("UPDATE") => Self::Update,
            Some("DELETE") => Self::Delete,
            other => Self::Other(other.map(str::to_string)),
        }
    }

    /// The listener group this intention dispatches to
    pub fn kind(&self) -> IntentionKind {
        match self {
            Self::Create => IntentionKind::Create,
            Self::Read => IntentionKind::Read,
            Self::Update => IntentionKind::Update,
            Self::Delete => IntentionKind::Delete,
            Self::Other(_) => IntentionKind::Other,
        }
    }

    /// The wire representation, if there was one
    pub fn as_wire(&self) -> Option<&str> {
        match self {
            Self::Create => Some("CREATE"),
            Self::Read => Some("READ"),
            Self::Update => Some("UPDATE"),
            Self::Delete => Some("DELETE"),
            Self::Other(raw) => raw.as_deref(),
        }
    }
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire().unwrap_or("<none>"))
    }
}

/// Listener groups of the dispatch router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionKind {
    Create,
    Read,
    Update,
    Delete,
    /// Catch-all for unrecognised or missing intentions
    Other,
}

impl IntentionKind {
    /// Every listener group, in dispatch-table order
    pub const ALL: [IntentionKind; 5] = [
        IntentionKind::Create,
        IntentionKind::Read,
        IntentionKind::Update,
        IntentionKind::Delete,
        IntentionKind::Other,
    ];
}

impl fmt::Display for IntentionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Read => write!(f, "query"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Other => write!(f, "any"),
        }
    }
}

/// A JSON value that passed incoming validation
#[derive(Debug, Clone)]
pub struct Validated(Value);

impl Validated {
    /// Only the consume loop (after running the incoming validator) may vouch for a value
    pub(crate) fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// A validated inbound envelope, decoded into its intention variant
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    msg_id: Value,
    intention: Intention,
    body: Value,
    routing_key: String,
}

impl IncomingMessage {
    /// Decode a validated envelope received under the given routing key
    pub fn decode(validated: Validated, routing_key: impl Into<String>) -> Self {
        let body = validated.into_inner();
        let msg_id = body.get(MSG_ID_FIELD).cloned().unwrap_or(Value::Null);
        let intention = Intention::from_wire(body.get(MSG_INTENTION_FIELD).and_then(Value::as_str));

        Self {
            msg_id,
            intention,
            body,
            routing_key: routing_key.into(),
        }
    }

    /// Correlation id exactly as received; `Null` when the envelope had none
    pub fn msg_id(&self) -> &Value {
        &self.msg_id
    }

    pub fn intention(&self) -> &Intention {
        &self.intention
    }

    /// The whole envelope as received
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Routing key the request was published with
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Look up a single payload field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Deserialize the envelope into a typed message
    pub fn parse_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

/// Build the minimal correlated failure reply `{msg_id, msg_intention, status: 500}`
pub fn fallback_envelope(msg_id: &Value, msg_intention: Option<&str>) -> Value {
    let mut envelope = Map::new();
    envelope.insert(MSG_ID_FIELD.to_string(), msg_id.clone());
    envelope.insert(
        MSG_INTENTION_FIELD.to_string(),
        msg_intention.map_or(Value::Null, Value::from),
    );
    envelope.insert(STATUS_FIELD.to_string(), Value::from(FALLBACK_STATUS));
    Value::Object(envelope)
}
