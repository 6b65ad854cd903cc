//! Typed view of one domain module's slice of the event log.
//!
//! # Responsibility
//! - Turn module commands into events under the module's `entity_type`.
//! - Answer `get`/`list`/`explain` by replaying events on every call.
//!
//! # Invariants
//! - Listing only returns entities that have a creation event.
//! - Archived entities are hidden unless explicitly requested.
//! - List order is creation order (`sequence_id` of the creation event).

use crate::audit::AuditTrail;
use crate::model::event::{EntityKey, Event, EventKind, SequenceId};
use crate::projection::ids::next_entity_id;
use crate::projection::{replay, Projection, ProjectionError, ProjectionResult};
use crate::store::{EventStore, QueryFilter, StoreResult};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

/// Options for listing projected entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub include_archived: bool,
}

/// Event log access scoped to projection `P`.
pub struct EntityLog<'s, S: EventStore, P: Projection> {
    store: &'s S,
    _projection: PhantomData<fn() -> P>,
}

impl<'s, S: EventStore, P: Projection> EntityLog<'s, S, P> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            _projection: PhantomData,
        }
    }

    /// Next id `create` would use.
    pub fn next_id(&self) -> StoreResult<i64> {
        next_entity_id(self.store, P::ENTITY_TYPE, P::CREATED.as_str())
    }

    /// Allocates an id and records the creation event.
    ///
    /// Returns the new entity id. If the emit fails no id is consumed.
    pub fn create<T>(&self, payload: &T) -> ProjectionResult<String>
    where
        T: Serialize + ?Sized,
    {
        let entity_id = self.next_id()?.to_string();
        self.store
            .emit(P::CREATED.as_str(), P::ENTITY_TYPE, &entity_id, payload)?;
        Ok(entity_id)
    }

    /// Records a mutation event for an existing entity.
    ///
    /// # Errors
    /// - `EntityNotFound` when the entity has never been created.
    pub fn record<T>(
        &self,
        entity_id: &str,
        kind: P::Kind,
        payload: &T,
    ) -> ProjectionResult<SequenceId>
    where
        T: Serialize + ?Sized,
    {
        if !self.exists(entity_id)? {
            return Err(ProjectionError::EntityNotFound(EntityKey::new(
                P::ENTITY_TYPE,
                entity_id,
            )));
        }

        let sequence_id = self
            .store
            .emit(kind.as_str(), P::ENTITY_TYPE, entity_id, payload)?;
        Ok(sequence_id)
    }

    /// Whether a creation event exists for `entity_id`.
    pub fn exists(&self, entity_id: &str) -> StoreResult<bool> {
        let filter = QueryFilter::for_entity(P::ENTITY_TYPE, entity_id)
            .with_event_type(P::CREATED.as_str());
        Ok(self.store.count(&filter)? > 0)
    }

    /// Projects one entity, including archived ones.
    pub fn get(&self, entity_id: &str) -> ProjectionResult<Option<P>> {
        let events = self.store.explain(P::ENTITY_TYPE, entity_id)?;
        replay(entity_id, &events)
    }

    /// Projects every entity of this type in creation order.
    pub fn list(&self, options: &ListOptions) -> ProjectionResult<Vec<P>> {
        let events = self
            .store
            .query(&QueryFilter::for_entity_type(P::ENTITY_TYPE).unbounded())?;

        let (order, mut histories) = group_by_entity(events, P::CREATED.as_str());
        let mut projected = Vec::with_capacity(order.len());
        for entity_id in order {
            let history = histories.remove(&entity_id).unwrap_or_default();
            if let Some(state) = replay::<P>(&entity_id, &history)? {
                if options.include_archived || !state.is_archived() {
                    projected.push(state);
                }
            }
        }

        Ok(projected)
    }

    /// Full audit trail of one entity.
    pub fn explain(&self, entity_id: &str) -> StoreResult<AuditTrail> {
        AuditTrail::load(self.store, P::ENTITY_TYPE, entity_id)
    }
}

/// Splits a log slice per entity. The order lists entities by their first
/// creation event; entities that were never created are left out of it.
fn group_by_entity(
    events: Vec<Event>,
    creation_event_type: &str,
) -> (Vec<String>, HashMap<String, Vec<Event>>) {
    let mut order = Vec::new();
    let mut created = HashSet::new();
    let mut histories: HashMap<String, Vec<Event>> = HashMap::new();

    for event in events {
        if event.event_type == creation_event_type && created.insert(event.entity_id.clone()) {
            order.push(event.entity_id.clone());
        }
        histories
            .entry(event.entity_id.clone())
            .or_default()
            .push(event);
    }

    (order, histories)
}
