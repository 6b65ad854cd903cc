//! Durable append-only event log.
//!
//! # Responsibility
//! - Define the `EventStore` contract consumed by every domain module.
//! - Keep SQL details inside the SQLite implementation.
//!
//! # Invariants
//! - The only write path is `emit`; no update or delete exists.
//! - Every read is ordered by ascending `sequence_id`.
//! - "No events" is a successful empty result, never an error.

use crate::db::DbError;
use crate::model::event::{Event, EventValidationError, SequenceId};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod filter;
pub mod sqlite;

pub use filter::{QueryFilter, QueryLimit, DEFAULT_QUERY_LIMIT};
pub use sqlite::SqliteEventStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error for event log writes and reads.
///
/// `Serialization` is always caller-correctable; `Storage` means the store
/// could not answer and must not be read as an empty result.
#[derive(Debug)]
pub enum StoreError {
    Validation(EventValidationError),
    Serialization(serde_json::Error),
    Storage(DbError),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid event: {err}"),
            Self::Serialization(err) => write!(f, "payload serialization failed: {err}"),
            Self::Storage(err) => write!(f, "event storage failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted event data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::InvalidData(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<EventValidationError> for StoreError {
    fn from(value: EventValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Storage(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(DbError::Sqlite(value))
    }
}

/// Append-only event log shared by all domain modules.
///
/// All calls block for exactly one database round trip. Implementations
/// are shared across threads; concurrent `emit` calls receive distinct,
/// increasing sequence ids.
pub trait EventStore: Send + Sync {
    /// Appends one event and returns its store-assigned sequence id.
    ///
    /// The row is committed before this returns. On error nothing was
    /// written.
    fn emit<P>(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        payload: &P,
    ) -> StoreResult<SequenceId>
    where
        P: Serialize + ?Sized;

    /// Returns events matching every set filter dimension.
    fn query(&self, filter: &QueryFilter) -> StoreResult<Vec<Event>>;

    /// Returns the complete, unbounded history of one entity.
    fn explain(&self, entity_type: &str, entity_id: &str) -> StoreResult<Vec<Event>> {
        if entity_type.is_empty() || entity_id.is_empty() {
            return Ok(Vec::new());
        }
        self.query(&QueryFilter::for_entity(entity_type, entity_id).unbounded())
    }

    /// Counts matching events without loading them. `filter.limit` is ignored.
    fn count(&self, filter: &QueryFilter) -> StoreResult<i64>;
}
