//! Audit trail ("explain") for a single entity.
//!
//! # Responsibility
//! - Expose the exact, unfiltered event sequence behind an entity's state.
//!
//! # Invariants
//! - Entries are in ascending `sequence_id` order and are never redacted or
//!   truncated here; shortening long fields is a presentation concern.
//! - An empty trail means the entity has no history, not that the store
//!   failed.

use crate::model::event::{EntityKey, Event};
use crate::store::{EventStore, StoreResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Chronological history of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditTrail {
    pub key: EntityKey,
    pub entries: Vec<Event>,
}

impl AuditTrail {
    /// Loads the complete history of `(entity_type, entity_id)`.
    pub fn load<S: EventStore>(store: &S, entity_type: &str, entity_id: &str) -> StoreResult<Self> {
        let entries = store.explain(entity_type, entity_id)?;
        Ok(Self {
            key: EntityKey::new(entity_type, entity_id),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Event] {
        &self.entries
    }

    /// Timestamp of the oldest entry.
    pub fn first_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.entries.first().map(|event| event.timestamp)
    }

    /// Timestamp of the newest entry.
    pub fn last_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|event| event.timestamp)
    }

    /// Event types in replay order.
    pub fn event_types(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|event| event.event_type.as_str())
            .collect()
    }
}
