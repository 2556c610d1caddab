//! # JSON Wire Codec
//!
//! Payloads are JSON in both directions. Decoding is strict: anything that is
//! not a complete JSON document is rejected with no partial envelope.

use bytes::Bytes;
use serde_json::Value;

use super::errors::{MessagingError, MessagingResult};

/// Decode a raw delivery payload into a JSON value
pub fn parse(raw: &[u8]) -> MessagingResult<Value> {
    serde_json::from_slice(raw).map_err(MessagingError::from)
}

/// Encode a JSON value for publishing
pub fn encode(value: &Value) -> MessagingResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| MessagingError::message_serialization(e.to_string()))
}
