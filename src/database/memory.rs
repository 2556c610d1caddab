//! In-process venue store.
//!
//! Venues keep their insertion order, which is also the order queries return
//! them in. Nothing survives a restart.
//!
//! ```rust
//! use venue_service::database::{MemoryVenueDatabase, VenueDatabase};
//! use venue_service::venue::{CreateVenueMessage, Envelope, ReadVenueMessage};
//!
//! # tokio_test::block_on(async {
//! let db = MemoryVenueDatabase::new();
//! let ids = db
//!     .create(&CreateVenueMessage {
//!         envelope: Envelope::new(1, "CREATE", "user-1"),
//!         name: "Main Hall".to_string(),
//!         capacity: 120,
//!         color: None,
//!         userid: "user-1".to_string(),
//!     })
//!     .await
//!     .unwrap();
//!
//! let venues = db.query(&ReadVenueMessage::all(Envelope::new(2, "READ", "user-1"))).await.unwrap();
//! assert_eq!(venues[0].id, ids[0]);
//! # });
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use super::{
    parse_id, CapacityFilter, DatabaseError, DatabaseResult, VenueDatabase, DUPLICATE_NAME,
    DUPLICATE_NAME_ON_UPDATE, NO_OPERATIONS, UNKNOWN_ENTITY,
};
use crate::venue::{
    CreateVenueMessage, DeleteVenueMessage, ReadVenueMessage, UpdateVenueMessage, Venue,
};

#[derive(Debug, Clone)]
struct StoredVenue {
    id: Uuid,
    name: String,
    capacity: i64,
    color: Option<String>,
    user: String,
}

impl StoredVenue {
    fn to_venue(&self) -> Venue {
        Venue {
            id: self.id.to_string(),
            name: self.name.clone(),
            capacity: self.capacity,
            color: self.color.clone(),
            user: self.user.clone(),
        }
    }
}

/// Venue store held in memory, in insertion order
#[derive(Debug, Default)]
pub struct MemoryVenueDatabase {
    venues: RwLock<Vec<StoredVenue>>,
}

impl MemoryVenueDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.venues.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.read().is_empty()
    }
}

#[async_trait]
impl VenueDatabase for MemoryVenueDatabase {
    async fn query(&self, query: &ReadVenueMessage) -> DatabaseResult<Vec<Venue>> {
        let ids = match &query.id {
            Some(filter) => Some(
                filter
                    .ids()
                    .into_iter()
                    .map(parse_id)
                    .collect::<DatabaseResult<HashSet<Uuid>>>()?,
            ),
            None => None,
        };
        let name = query.name.as_ref().map(|name| name.to_lowercase());
        let capacity = CapacityFilter::from_query(query);

        let venues = self.venues.read();
        let matches: Vec<Venue> = venues
            .iter()
            .filter(|venue| ids.as_ref().map_or(true, |ids| ids.contains(&venue.id)))
            .filter(|venue| {
                name.as_ref()
                    .map_or(true, |name| venue.name.to_lowercase().contains(name.as_str()))
            })
            .filter(|venue| capacity.matches(venue.capacity))
            .map(StoredVenue::to_venue)
            .collect();

        debug!(matched = matches.len(), "Memory venue query");
        Ok(matches)
    }

    async fn create(&self, create: &CreateVenueMessage) -> DatabaseResult<Vec<String>> {
        let mut venues = self.venues.write();
        if venues.iter().any(|venue| venue.name == create.name) {
            return Err(DatabaseError::client_facing(DUPLICATE_NAME));
        }

        let id = Uuid::new_v4();
        venues.push(StoredVenue {
            id,
            name: create.name.clone(),
            capacity: create.capacity,
            color: create.color.clone(),
            user: create.userid.clone(),
        });

        Ok(vec![id.to_string()])
    }

    async fn update(&self, update: &UpdateVenueMessage) -> DatabaseResult<Vec<String>> {
        let id = parse_id(&update.id)?;
        if !update.has_changes() {
            return Err(DatabaseError::client_facing(NO_OPERATIONS));
        }

        let mut venues = self.venues.write();
        if let Some(name) = &update.name {
            if venues.iter().any(|venue| venue.id != id && &venue.name == name) {
                return Err(DatabaseError::client_facing(DUPLICATE_NAME_ON_UPDATE));
            }
        }

        let venue = venues
            .iter_mut()
            .find(|venue| venue.id == id)
            .ok_or_else(|| DatabaseError::client_facing(UNKNOWN_ENTITY))?;

        if let Some(name) = &update.name {
            venue.name = name.clone();
        }
        if let Some(capacity) = update.capacity {
            venue.capacity = capacity;
        }
        if let Some(color) = &update.color {
            venue.color = Some(color.clone());
        }

        Ok(vec![id.to_string()])
    }

    async fn delete(&self, delete: &DeleteVenueMessage) -> DatabaseResult<Vec<String>> {
        let id = parse_id(&delete.id)?;

        let mut venues = self.venues.write();
        let position = venues
            .iter()
            .position(|venue| venue.id == id)
            .ok_or_else(|| DatabaseError::client_facing(UNKNOWN_ENTITY))?;
        venues.remove(position);

        Ok(vec![id.to_string()])
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
