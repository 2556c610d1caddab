//! # Venue Domain
//!
//! Typed venue requests and replies, the discovery protocol other services
//! use to ask about venue dependents, and the validators the broker handler
//! runs over all of them.

pub mod discovery;
pub mod messages;
pub mod validators;

pub use discovery::{
    AssetType, DiscoverResponse, DiscoveryDeleteResponse, DiscoveryKind, DiscoveryMessage,
};
pub use messages::{
    status, CreateVenueMessage, DeleteVenueMessage, Envelope, IdFilter, ReadVenueMessage,
    UpdateVenueMessage, Venue, VenueMessage, VenueResponse,
};
pub use validators::{venue_response_validator, VenueMessageValidator};
