//! # Discovery Messages
//!
//! Other services ask the venue service how strongly an asset depends on
//! venues before they change it. Discovery requests arrive as `READ`
//! envelopes whose routing key ends in `.discover` (count dependents) or
//! `.delete` (remove dependents).

use serde::{Deserialize, Serialize};

use super::messages::{status, Envelope};

/// Routing key suffix of a discovery count request
pub const DISCOVER_SUFFIX: &str = ".discover";

/// Routing key suffix of a discovery removal request
pub const REMOVE_SUFFIX: &str = ".delete";

/// What kind of asset a discovery request is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    User,
    Venue,
    #[serde(other)]
    Other,
}

/// Which discovery operation a routing key selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    Discover,
    Remove,
}

impl DiscoveryKind {
    pub fn from_routing_key(routing_key: &str) -> Option<Self> {
        if routing_key.ends_with(DISCOVER_SUFFIX) {
            Some(Self::Discover)
        } else if routing_key.ends_with(REMOVE_SUFFIX) {
            Some(Self::Remove)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(rename = "assetType")]
    pub asset_type: AssetType,
    #[serde(rename = "assetID")]
    pub asset_id: String,
}

/// Reply to a discovery count request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub msg_id: i64,
    pub msg_intention: String,
    pub status: i64,
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Venues that would block removing the asset
    pub restrict: i64,
    /// Venues that would change if the asset were removed
    pub modify: i64,
}

impl DiscoverResponse {
    pub fn new(envelope: &Envelope, restrict: i64, modify: i64) -> Self {
        Self {
            msg_id: envelope.msg_id,
            msg_intention: "READ".to_string(),
            status: status::SUCCESS,
            user_id: envelope.user_id.clone(),
            restrict,
            modify,
        }
    }
}

/// Reply to a discovery removal request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDeleteResponse {
    pub msg_id: i64,
    pub msg_intention: String,
    pub status: i64,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub restrict: i64,
    pub modified: i64,
    pub successful: bool,
}

impl DiscoveryDeleteResponse {
    pub fn new(envelope: &Envelope, modified: i64, successful: bool) -> Self {
        Self {
            msg_id: envelope.msg_id,
            msg_intention: "DELETE".to_string(),
            status: status::SUCCESS,
            user_id: envelope.user_id.clone(),
            restrict: 0,
            modified,
            successful,
        }
    }
}
