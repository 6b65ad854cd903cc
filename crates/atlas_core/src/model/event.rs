//! Event record model.
//!
//! # Responsibility
//! - Define the durable `Event` row and the `EventDraft` written by `emit`.
//! - Provide typed access to event vocabularies and payload documents.
//!
//! # Invariants
//! - `event_type`, `entity_type` and `entity_id` are never blank.
//! - `sequence_id` is assigned by storage, never by callers.
//! - Timestamps are stored as fixed-width RFC 3339 UTC text, so lexical
//!   order of the stored column matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Structured payload carried by an event.
///
/// Opaque to the store; interpreted only by projection folds.
pub type Document = serde_json::Value;

/// Store-assigned position of an event in the global log.
pub type SequenceId = i64;

/// Identity of one replay unit: all events sharing this key describe one
/// entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// One immutable fact recorded in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Total order across the whole log.
    pub sequence_id: SequenceId,
    /// Open vocabulary, e.g. `TASK_CREATED`.
    pub event_type: String,
    /// Kind of entity, e.g. `task`.
    pub entity_type: String,
    /// Stored as text even when numeric.
    pub entity_id: String,
    pub payload: Document,
    /// Insertion wall-clock time. Informational only.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Returns the replay key this event belongs to.
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.as_str(), self.entity_id.as_str())
    }

    /// Maps `event_type` into a module vocabulary.
    ///
    /// Returns `None` for types the vocabulary does not know, which folds
    /// treat as no-ops.
    pub fn kind<K: EventKind>(&self) -> Option<K> {
        K::parse(&self.event_type)
    }

    /// Deserializes the payload into a concrete payload struct.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Closed, per-module set of event type names.
///
/// The store only ever compares strings; this trait gives each domain module
/// compile-time checked names on top of that.
pub trait EventKind: Sized + Copy {
    /// Stored `event_type` string for this kind.
    fn as_str(self) -> &'static str;
    /// Inverse of `as_str`; unknown names map to `None`.
    fn parse(value: &str) -> Option<Self>;
}

/// Validated, serialized event waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: Document,
}

impl EventDraft {
    /// Builds a draft, checking identity fields before any storage work.
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        payload: Document,
    ) -> Result<Self, EventValidationError> {
        if event_type.trim().is_empty() {
            return Err(EventValidationError::EmptyEventType);
        }
        if entity_type.trim().is_empty() {
            return Err(EventValidationError::EmptyEntityType);
        }
        if entity_id.trim().is_empty() {
            return Err(EventValidationError::EmptyEntityId);
        }

        Ok(Self {
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload,
        })
    }
}

/// Rejection reasons for malformed `emit` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventValidationError {
    EmptyEventType,
    EmptyEntityType,
    EmptyEntityId,
}

impl Display for EventValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyEventType => write!(f, "event_type must not be empty"),
            Self::EmptyEntityType => write!(f, "entity_type must not be empty"),
            Self::EmptyEntityId => write!(f, "entity_id must not be empty"),
        }
    }
}

impl Error for EventValidationError {}

/// Formats a timestamp in the stored column format.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp column value.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
