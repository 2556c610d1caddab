//! # Venue Message Types
//!
//! Typed shapes of the venue service's requests and replies. Every message
//! carries the common envelope (`msg_id`, `msg_intention`, `status`,
//! `userID`) flattened next to its intention-specific fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messaging::message::{Intention, IncomingMessage};

/// Reply status codes
pub mod status {
    /// The operation succeeded
    pub const SUCCESS: i64 = 200;
    /// The operation was rejected for a reason the requester can act on
    pub const FAIL: i64 = 405;
    /// The operation failed inside the service
    pub const INTERNAL_SERVER_ERROR: i64 = 500;
    /// The intention is not supported by this service
    pub const NOT_IMPLEMENTED: i64 = 501;
}

/// Fields shared by every venue message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub msg_id: i64,
    pub msg_intention: String,
    #[serde(default)]
    pub status: i64,
    #[serde(rename = "userID")]
    pub user_id: String,
}

impl Envelope {
    pub fn new(msg_id: i64, msg_intention: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            msg_id,
            msg_intention: msg_intention.into(),
            status: 0,
            user_id: user_id.into(),
        }
    }
}

/// One id or a list of ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdFilter {
    One(String),
    Many(Vec<String>),
}

impl IdFilter {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::One(id) => vec![id.as_str()],
            Self::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// `READ`: all filters are optional and combine with AND
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadVenueMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<IdFilter>,
    /// Case-insensitive substring of the venue name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approximate_capacity: Option<i64>,
    /// Half-width of the approximate capacity window; 20 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approximate_fuzziness: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_capacity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_capacity: Option<i64>,
}

impl ReadVenueMessage {
    /// A query with no filters
    pub fn all(envelope: Envelope) -> Self {
        Self {
            envelope,
            id: None,
            name: None,
            capacity: None,
            approximate_capacity: None,
            approximate_fuzziness: None,
            minimum_capacity: None,
            maximum_capacity: None,
        }
    }
}

/// `CREATE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateVenueMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub name: String,
    pub capacity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Owner of the new venue
    pub userid: String,
}

/// `UPDATE`: only the fields present are changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateVenueMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl UpdateVenueMessage {
    /// Whether the update changes anything
    pub fn has_changes(&self) -> bool {
        self.name.is_some() || self.capacity.is_some() || self.color.is_some()
    }
}

/// `DELETE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteVenueMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub id: String,
}

/// A venue as returned to requesters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub capacity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Owner of the venue
    pub user: String,
}

/// A decoded venue request
#[derive(Debug, Clone, PartialEq)]
pub enum VenueMessage {
    Create(CreateVenueMessage),
    Read(ReadVenueMessage),
    Update(UpdateVenueMessage),
    Delete(DeleteVenueMessage),
}

impl VenueMessage {
    /// Decode the typed request for a dispatched message.
    ///
    /// Returns `Ok(None)` for intentions the venue service does not handle.
    pub fn from_incoming(message: &IncomingMessage) -> Result<Option<Self>, serde_json::Error> {
        let decoded = match message.intention() {
            Intention::Create => Some(Self::Create(message.parse_as()?)),
            Intention::Read => Some(Self::Read(message.parse_as()?)),
            Intention::Update => Some(Self::Update(message.parse_as()?)),
            Intention::Delete => Some(Self::Delete(message.parse_as()?)),
            Intention::Other(_) => None,
        };
        Ok(decoded)
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Create(m) => &m.envelope,
            Self::Read(m) => &m.envelope,
            Self::Update(m) => &m.envelope,
            Self::Delete(m) => &m.envelope,
        }
    }
}

/// Reply to a venue request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueResponse {
    pub msg_id: i64,
    pub msg_intention: String,
    pub status: i64,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub result: Vec<Value>,
}

impl VenueResponse {
    /// A reply correlated with `envelope`
    pub fn new(envelope: &Envelope, status: i64, result: Vec<Value>) -> Self {
        Self {
            msg_id: envelope.msg_id,
            msg_intention: envelope.msg_intention.clone(),
            status,
            user_id: envelope.user_id.clone(),
            result,
        }
    }

    /// A reply whose result is a list of ids or messages
    pub fn strings(envelope: &Envelope, status: i64, result: Vec<String>) -> Self {
        Self::new(envelope, status, result.into_iter().map(Value::from).collect())
    }

    /// A reply carrying venue records
    pub fn venues(envelope: &Envelope, status: i64, venues: Vec<Venue>) -> Self {
        let result = venues
            .into_iter()
            .filter_map(|venue| serde_json::to_value(venue).ok())
            .collect();
        Self::new(envelope, status, result)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
