//! SQLite-backed event store.
//!
//! # Responsibility
//! - Append events inside immediate transactions and hand back their ids.
//! - Answer filtered range reads in `sequence_id` order.
//!
//! # Invariants
//! - The owned connection is the single synchronization point for writes.
//! - Read paths reject rows that cannot be decoded instead of masking them.
//! - Payload contents are never written to logs.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::event::{format_timestamp, parse_timestamp, Event, EventDraft, SequenceId};
use crate::store::filter::{QueryFilter, DEFAULT_QUERY_LIMIT};
use crate::store::{EventStore, StoreError, StoreResult};
use chrono::Utc;
use log::{debug, error};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

const EVENT_SELECT_SQL: &str = "SELECT
    sequence_id,
    event_type,
    entity_type,
    entity_id,
    payload,
    timestamp
FROM events";

/// Event store owning one migrated SQLite connection.
///
/// Share it between threads with `Arc`; the internal lock serializes
/// access to the connection.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
    default_limit: u32,
}

impl SqliteEventStore {
    /// Opens (or creates) the event database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens a private in-memory event database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Wraps an already opened connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` when the `events` table is absent.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_limit: DEFAULT_QUERY_LIMIT,
        })
    }

    /// Overrides the cap used by queries with `QueryLimit::Default`.
    #[must_use]
    pub fn with_default_limit(mut self, default_limit: u32) -> Self {
        self.default_limit = default_limit;
        self
    }

    /// Returns the cap used by queries with `QueryLimit::Default`.
    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Storage(DbError::ConnectionPoisoned))
    }

    fn insert_draft(&self, draft: &EventDraft) -> StoreResult<SequenceId> {
        let payload_text =
            serde_json::to_string(&draft.payload).map_err(StoreError::Serialization)?;
        let timestamp = format_timestamp(&Utc::now());

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO events (
                event_type,
                entity_type,
                entity_id,
                payload,
                timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                draft.event_type.as_str(),
                draft.entity_type.as_str(),
                draft.entity_id.as_str(),
                payload_text,
                timestamp,
            ],
        )?;
        let sequence_id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(sequence_id)
    }

    fn select(&self, filter: &QueryFilter) -> StoreResult<Vec<Event>> {
        let (where_clause, mut bind_values) = filter.where_clause();
        let mut sql = format!("{EVENT_SELECT_SQL} WHERE {where_clause} ORDER BY sequence_id ASC");
        if let Some(limit) = filter.effective_limit(self.default_limit) {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut events = Vec::new();

        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }

        Ok(events)
    }
}

impl EventStore for SqliteEventStore {
    fn emit<P>(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        payload: &P,
    ) -> StoreResult<SequenceId>
    where
        P: Serialize + ?Sized,
    {
        let started_at = Instant::now();
        let document = serde_json::to_value(payload).map_err(|err| {
            error!(
                "event=event_emit module=store status=error error_code=payload_serialization_failed event_type={} entity_type={}",
                event_type, entity_type
            );
            StoreError::Serialization(err)
        })?;
        let draft = EventDraft::new(event_type, entity_type, entity_id, document)?;

        match self.insert_draft(&draft) {
            Ok(sequence_id) => {
                debug!(
                    "event=event_emit module=store status=ok event_type={} entity_type={} sequence_id={} duration_ms={}",
                    draft.event_type,
                    draft.entity_type,
                    sequence_id,
                    started_at.elapsed().as_millis()
                );
                Ok(sequence_id)
            }
            Err(err) => {
                error!(
                    "event=event_emit module=store status=error error_code=event_insert_failed event_type={} entity_type={} duration_ms={} error={}",
                    draft.event_type,
                    draft.entity_type,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn query(&self, filter: &QueryFilter) -> StoreResult<Vec<Event>> {
        let started_at = Instant::now();
        match self.select(filter) {
            Ok(events) => {
                debug!(
                    "event=event_query module=store status=ok rows={} duration_ms={}",
                    events.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(events)
            }
            Err(err) => {
                error!(
                    "event=event_query module=store status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn explain(&self, entity_type: &str, entity_id: &str) -> StoreResult<Vec<Event>> {
        // Blank keys can never be emitted; they must not widen into a scan.
        if entity_type.is_empty() || entity_id.is_empty() {
            return Ok(Vec::new());
        }
        let filter = QueryFilter::for_entity(entity_type, entity_id).unbounded();
        let events = self.select(&filter).inspect_err(|err| {
            error!(
                "event=event_explain module=store status=error entity_type={} error={}",
                entity_type, err
            );
        })?;

        debug!(
            "event=event_explain module=store status=ok entity_type={} rows={}",
            entity_type,
            events.len()
        );
        Ok(events)
    }

    fn count(&self, filter: &QueryFilter) -> StoreResult<i64> {
        let (where_clause, bind_values) = filter.where_clause();
        let sql = format!("SELECT COUNT(*) FROM events WHERE {where_clause}");

        let conn = self.lock()?;
        let count = conn
            .query_row(&sql, params_from_iter(bind_values), |row| row.get::<_, i64>(0))
            .map_err(|err| {
                error!(
                    "event=event_count module=store status=error error={}",
                    err
                );
                StoreError::from(err)
            })?;

        debug!("event=event_count module=store status=ok count={}", count);
        Ok(count)
    }
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let table_exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'events'
        );",
        [],
        |row| row.get(0),
    )?;
    if table_exists == 0 {
        return Err(StoreError::MissingRequiredTable("events"));
    }

    Ok(())
}

fn parse_event_row(row: &Row<'_>) -> StoreResult<Event> {
    let sequence_id: SequenceId = row.get("sequence_id")?;

    let payload_text: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_text).map_err(|err| {
        StoreError::InvalidData(format!(
            "invalid payload document in events.payload for sequence_id {sequence_id}: {err}"
        ))
    })?;

    let timestamp_text: String = row.get("timestamp")?;
    let timestamp = parse_timestamp(&timestamp_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid timestamp `{timestamp_text}` in events.timestamp for sequence_id {sequence_id}"
        ))
    })?;

    Ok(Event {
        sequence_id,
        event_type: row.get("event_type")?,
        entity_type: row.get("entity_type")?,
        entity_id: row.get("entity_id")?,
        payload,
        timestamp,
    })
}
