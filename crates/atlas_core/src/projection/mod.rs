//! Projection contract: current state as a fold over an entity's events.
//!
//! # Responsibility
//! - Define the `Projection` trait domain modules implement.
//! - Replay an ordered event slice into a projected state value.
//! - Allocate entity identifiers from the creation events in the log.
//!
//! # Invariants
//! - Folds are pure and always start from scratch; no derived state is
//!   cached or persisted.
//! - An entity does not exist until its creation event appears.
//! - Event types a fold does not recognize are ignored.
//! - Archival is a replayed state flag; history is never removed.

use crate::model::event::{EntityKey, Event, EventKind, SequenceId};
use crate::store::StoreError;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod entity_log;
pub mod ids;

pub use entity_log::{EntityLog, ListOptions};
pub use ids::next_entity_id;

pub type ProjectionResult<T> = Result<T, ProjectionError>;

#[derive(Debug)]
pub enum ProjectionError {
    Store(StoreError),
    /// A recognized event carried a payload the fold cannot decode.
    Payload {
        event_type: String,
        sequence_id: SequenceId,
        source: serde_json::Error,
    },
    /// A mutation targeted an entity with no creation event.
    EntityNotFound(EntityKey),
}

impl Display for ProjectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Payload {
                event_type,
                sequence_id,
                source,
            } => write!(
                f,
                "cannot decode `{event_type}` payload at sequence_id {sequence_id}: {source}"
            ),
            Self::EntityNotFound(key) => write!(f, "entity not found: {key}"),
        }
    }
}

impl Error for ProjectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Payload { source, .. } => Some(source),
            Self::EntityNotFound(_) => None,
        }
    }
}

impl From<StoreError> for ProjectionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Current state of one entity, derived by folding its events.
///
/// Implementors deserialize payloads into concrete structs inside `apply`
/// (see [`decode_payload`]) instead of carrying untyped documents around.
pub trait Projection: Sized {
    /// This module's event vocabulary.
    type Kind: EventKind;

    /// `entity_type` under which this module's events are stored.
    const ENTITY_TYPE: &'static str;

    /// Event that brings an entity into existence.
    const CREATED: Self::Kind;

    /// Blank state the creation event is applied to.
    fn initial(entity_id: &str) -> Self;

    /// Applies one event. Must ignore event types it does not recognize.
    fn apply(&mut self, event: &Event) -> ProjectionResult<()>;

    /// Whether a tombstone event has archived this entity.
    fn is_archived(&self) -> bool {
        false
    }
}

/// Folds the events of `(P::ENTITY_TYPE, entity_id)` into a projection.
///
/// Events belonging to other entities are skipped, as are events recorded
/// before the first creation event. Returns `None` when the slice holds no
/// creation event for this entity.
pub fn replay<P: Projection>(entity_id: &str, events: &[Event]) -> ProjectionResult<Option<P>> {
    let created = P::CREATED.as_str();
    let mut state: Option<P> = None;

    for event in events
        .iter()
        .filter(|event| event.entity_type == P::ENTITY_TYPE && event.entity_id == entity_id)
    {
        match state.as_mut() {
            Some(current) => current.apply(event)?,
            None if event.event_type == created => {
                let mut fresh = P::initial(entity_id);
                fresh.apply(event)?;
                state = Some(fresh);
            }
            None => {}
        }
    }

    Ok(state)
}

/// Decodes an event payload into `T`, tagging failures with the event
/// position.
pub fn decode_payload<T: DeserializeOwned>(event: &Event) -> ProjectionResult<T> {
    event
        .decode_payload()
        .map_err(|source| ProjectionError::Payload {
            event_type: event.event_type.clone(),
            sequence_id: event.sequence_id,
            source,
        })
}
