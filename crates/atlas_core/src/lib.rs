//! Event spine for the Atlas personal productivity suite.
//!
//! Domain modules never store state directly. Each mutation is appended to
//! the event log with `emit`, and every read folds the entity's history
//! back into a projection.

pub mod audit;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod projection;
pub mod store;

pub use audit::AuditTrail;
pub use config::{AtlasConfig, ConfigError, SettingsFile};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::event::{
    Document, EntityKey, Event, EventDraft, EventKind, EventValidationError, SequenceId,
};
pub use projection::{
    decode_payload, next_entity_id, replay, EntityLog, ListOptions, Projection, ProjectionError,
    ProjectionResult,
};
pub use store::{
    EventStore, QueryFilter, QueryLimit, SqliteEventStore, StoreError, StoreResult,
    DEFAULT_QUERY_LIMIT,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
