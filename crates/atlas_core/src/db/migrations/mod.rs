//! Schema migrations for the event database.
//!
//! # Responsibility
//! - Keep the ordered list of schema scripts.
//! - Bring a connection up to the latest schema inside one transaction.
//!
//! # Invariants
//! - `version` values are strictly increasing; the last one is the schema
//!   version mirrored to `PRAGMA user_version`.
//! - A migration never loses event rows. The row count is checked after
//!   every script and a shrinking log rolls the whole run back.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_events.sql"),
}];

/// Schema version this binary migrates to.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies every migration newer than the database's `user_version`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is newer than this binary.
/// - `MigrationLostEvents` when a script would drop event rows.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    run_migrations(conn, MIGRATIONS)
}

/// Reads the schema version recorded in `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

pub(crate) fn run_migrations(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    let from_version = current_user_version(conn)?;
    let target = migrations.last().map_or(0, |migration| migration.version);

    if from_version > target {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: target,
        });
    }
    if from_version == target {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations.iter().filter(|m| m.version > from_version) {
        let rows_before = event_row_count(&tx)?;
        tx.execute_batch(migration.sql)?;
        let rows_after = event_row_count(&tx)?;
        if rows_after < rows_before {
            // Dropping `tx` rolls back every script of this run.
            return Err(DbError::MigrationLostEvents {
                version: migration.version,
                rows_before,
                rows_after,
            });
        }
        tx.pragma_update(None, "user_version", migration.version)?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        from_version, target
    );
    Ok(())
}

/// Rows in `events`, or zero before the table exists.
fn event_row_count(conn: &Connection) -> DbResult<i64> {
    let table_exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'events');",
        [],
        |row| row.get(0),
    )?;
    if table_exists == 0 {
        return Ok(0);
    }
    Ok(conn.query_row("SELECT COUNT(*) FROM events;", [], |row| row.get(0))?)
}
