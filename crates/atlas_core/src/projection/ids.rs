//! Entity identifier allocation.
//!
//! The store assigns no entity ids. A module takes one more than the largest
//! numeric id among its creation events, or `1` for an empty log.
//!
//! This scan is only safe while a single process owns the database and
//! creates entities of one type one at a time. Two writers allocating
//! concurrently can receive the same id.

use crate::store::{EventStore, QueryFilter, StoreError, StoreResult};

/// Returns the next free numeric id for `entity_type`.
///
/// Non-numeric ids on creation events are skipped. The result is computed
/// from the log on every call, so a failed emit never consumes an id.
///
/// # Errors
/// - `InvalidData` when the largest id is already `i64::MAX`.
pub fn next_entity_id<S: EventStore>(
    store: &S,
    entity_type: &str,
    creation_event_type: &str,
) -> StoreResult<i64> {
    let filter = QueryFilter::for_entity_type(entity_type)
        .with_event_type(creation_event_type)
        .unbounded();
    let created = store.query(&filter)?;

    let max_id = created
        .iter()
        .filter_map(|event| event.entity_id.trim().parse::<i64>().ok())
        .max();

    match max_id {
        None => Ok(1),
        Some(max) => max.checked_add(1).ok_or_else(|| {
            StoreError::InvalidData(format!("entity id space exhausted for {entity_type}"))
        }),
    }
}
