//! # Venue Storage
//!
//! The [`VenueDatabase`] trait is the storage seam the venue binding talks to.
//! Two implementations ship with the crate:
//!
//! - [`memory::MemoryVenueDatabase`] - process-local store, used in tests and
//!   when no database is configured
//! - [`postgres::PostgresVenueDatabase`] - PostgreSQL via sqlx
//!
//! Both share the same error contract: [`DatabaseError::ClientFacing`] messages
//! are returned to the requester verbatim, every other variant is internal and
//! reported to the requester only as a generic failure.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use venue_service::database::{memory::MemoryVenueDatabase, VenueDatabase};
//! use venue_service::venue::{Envelope, ReadVenueMessage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = MemoryVenueDatabase::new();
//! let all = db.query(&ReadVenueMessage::all(Envelope::new(1, "READ", "user"))).await?;
//! assert!(all.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::venue::{
    CreateVenueMessage, DeleteVenueMessage, ReadVenueMessage, UpdateVenueMessage, Venue,
};

pub use memory::MemoryVenueDatabase;
pub use postgres::PostgresVenueDatabase;

/// Half-width of the approximate capacity window when the request gives none
pub const DEFAULT_APPROXIMATE_FUZZINESS: i64 = 20;

/// Client-facing message for a duplicate name on create
pub const DUPLICATE_NAME: &str = "duplicate venue name";

/// Client-facing message for a rename onto an existing name
pub const DUPLICATE_NAME_ON_UPDATE: &str = "cannot update to existing venue name";

/// Client-facing message for an id that matches no venue
pub const UNKNOWN_ENTITY: &str = "invalid entity ID";

/// Client-facing message for an update that changes nothing
pub const NO_OPERATIONS: &str = "no operations provided";

/// Storage errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A rejection the requester can act on; its message is returned verbatim
    #[error("{0}")]
    ClientFacing(String),

    /// The id is not a well-formed venue id
    #[error("invalid object ID: {0}")]
    InvalidId(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl DatabaseError {
    pub fn client_facing(message: impl Into<String>) -> Self {
        Self::ClientFacing(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the message may be shown to the requester
    pub fn is_client_facing(&self) -> bool {
        matches!(self, Self::ClientFacing(_))
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Venue storage operations
#[async_trait]
pub trait VenueDatabase: Send + Sync {
    /// Venues matching every filter present in the request
    async fn query(&self, query: &ReadVenueMessage) -> DatabaseResult<Vec<Venue>>;

    /// Store a new venue, returning its id
    async fn create(&self, create: &CreateVenueMessage) -> DatabaseResult<Vec<String>>;

    /// Apply the fields present in the request, returning the id of the changed venue
    async fn update(&self, update: &UpdateVenueMessage) -> DatabaseResult<Vec<String>>;

    /// Remove a venue, returning its id
    async fn delete(&self, delete: &DeleteVenueMessage) -> DatabaseResult<Vec<String>>;

    /// Name used in log lines
    fn backend_name(&self) -> &str;
}

/// Parse a venue id
pub fn parse_id(id: &str) -> DatabaseResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| DatabaseError::InvalidId(id.to_string()))
}

/// Capacity constraints derived from a read request.
///
/// An approximate capacity replaces an exact one; explicit minimum and maximum
/// bounds replace the corresponding side of the approximate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapacityFilter {
    pub exact: Option<i64>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
}

impl CapacityFilter {
    pub fn from_query(query: &ReadVenueMessage) -> Self {
        let mut filter = Self {
            exact: query.capacity,
            ..Self::default()
        };

        if let Some(approximate) = query.approximate_capacity {
            let fuzziness = query
                .approximate_fuzziness
                .unwrap_or(DEFAULT_APPROXIMATE_FUZZINESS);
            filter.exact = None;
            filter.minimum = Some(approximate - fuzziness);
            filter.maximum = Some(approximate + fuzziness);
        }

        if let Some(maximum) = query.maximum_capacity {
            filter.maximum = Some(maximum);
        }
        if let Some(minimum) = query.minimum_capacity {
            filter.minimum = Some(minimum);
        }

        filter
    }

    pub fn matches(&self, capacity: i64) -> bool {
        self.exact.map_or(true, |exact| capacity == exact)
            && self.minimum.map_or(true, |minimum| capacity >= minimum)
            && self.maximum.map_or(true, |maximum| capacity <= maximum)
    }
}
