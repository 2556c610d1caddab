//! # Venue Validators
//!
//! Inbound and outbound validators for the venue service. Inbound envelopes
//! must carry the common envelope fields; the four known intentions must
//! additionally match their typed shape. Unknown intentions pass so the
//! catch-all can answer them.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::discovery::{DiscoverResponse, DiscoveryDeleteResponse};
use super::messages::{
    CreateVenueMessage, DeleteVenueMessage, Envelope, ReadVenueMessage, UpdateVenueMessage,
    VenueResponse,
};
use crate::messaging::message::{Intention, MSG_INTENTION_FIELD};
use crate::messaging::validator::{
    MessageValidator, SerdeValidator, SharedValidator, ValidationError,
};

/// Validates inbound venue requests
#[derive(Debug, Clone, Copy, Default)]
pub struct VenueMessageValidator;

impl VenueMessageValidator {
    pub fn shared() -> SharedValidator {
        Arc::new(Self)
    }

    fn conforms<T: DeserializeOwned>(candidate: &Value) -> bool {
        match T::deserialize(candidate) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(reason = %e, "Venue request does not match its intention's shape");
                false
            }
        }
    }
}

#[async_trait]
impl MessageValidator for VenueMessageValidator {
    async fn validate(&self, candidate: &Value) -> Result<bool, ValidationError> {
        if !Self::conforms::<Envelope>(candidate) {
            return Ok(false);
        }

        let intention =
            Intention::from_wire(candidate.get(MSG_INTENTION_FIELD).and_then(Value::as_str));
        let verdict = match intention {
            Intention::Create => Self::conforms::<CreateVenueMessage>(candidate),
            Intention::Read => Self::conforms::<ReadVenueMessage>(candidate),
            Intention::Update => Self::conforms::<UpdateVenueMessage>(candidate),
            Intention::Delete => Self::conforms::<DeleteVenueMessage>(candidate),
            Intention::Other(_) => true,
        };
        Ok(verdict)
    }

    fn validator_name(&self) -> &str {
        "venue_message"
    }
}

/// Any reply the venue service may publish
#[derive(Debug, Deserialize)]
#[serde(untagged)]
#[allow(dead_code)]
enum OutgoingReply {
    Venue(VenueResponse),
    Discover(DiscoverResponse),
    DiscoveryDelete(DiscoveryDeleteResponse),
}

/// Validates outbound venue and discovery replies
pub fn venue_response_validator() -> SharedValidator {
    Arc::new(SerdeValidator::<OutgoingReply>::new("venue_response"))
}
