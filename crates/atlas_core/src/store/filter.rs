//! Query filter and SQL predicate builder.
//!
//! # Invariants
//! - Unset dimensions match everything. A blank `entity_type` or
//!   `event_type` counts as unset.
//! - A set `entity_id` always filters, even when empty.
//! - Set dimensions are combined with `AND`.
//! - Values are always bound as parameters, never interpolated.

use crate::model::event::format_timestamp;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;

/// Row cap applied when a query does not choose its own limit.
pub const DEFAULT_QUERY_LIMIT: u32 = 1000;

/// Row cap for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryLimit {
    /// The store's configured default cap.
    #[default]
    Default,
    /// At most this many rows.
    Max(u32),
    /// No cap. Used for replay and id allocation.
    Unbounded,
}

/// Optional combination of event filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub event_type: Option<String>,
    /// Only events with `timestamp >= since`.
    pub since: Option<DateTime<Utc>>,
    pub limit: QueryLimit,
}

impl QueryFilter {
    /// Matches every event, capped at the default limit.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_entity_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            ..Self::default()
        }
    }

    pub fn for_entity(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    #[must_use]
    pub fn limit(mut self, max: u32) -> Self {
        self.limit = QueryLimit::Max(max);
        self
    }

    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.limit = QueryLimit::Unbounded;
        self
    }

    /// Builds the `WHERE` clause and its bind values.
    pub(crate) fn where_clause(&self) -> (String, Vec<Value>) {
        let mut conditions: Vec<&'static str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(entity_type) = non_blank(self.entity_type.as_deref()) {
            conditions.push("entity_type = ?");
            bind_values.push(Value::Text(entity_type.to_string()));
        }
        if let Some(entity_id) = self.entity_id.as_deref() {
            conditions.push("entity_id = ?");
            bind_values.push(Value::Text(entity_id.to_string()));
        }
        if let Some(event_type) = non_blank(self.event_type.as_deref()) {
            conditions.push("event_type = ?");
            bind_values.push(Value::Text(event_type.to_string()));
        }
        if let Some(since) = self.since.as_ref() {
            conditions.push("timestamp >= ?");
            bind_values.push(Value::Text(format_timestamp(since)));
        }

        if conditions.is_empty() {
            return ("1 = 1".to_string(), bind_values);
        }
        (conditions.join(" AND "), bind_values)
    }

    /// Resolves the row cap; `None` means no `LIMIT` clause.
    pub(crate) fn effective_limit(&self, default_limit: u32) -> Option<u32> {
        match self.limit {
            QueryLimit::Default => Some(default_limit),
            QueryLimit::Max(max) => Some(max),
            QueryLimit::Unbounded => None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|inner| !inner.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{QueryFilter, QueryLimit, DEFAULT_QUERY_LIMIT};
    use chrono::{TimeZone, Utc};
    use rusqlite::types::Value;

    #[test]
    fn empty_filter_matches_everything() {
        let (clause, binds) = QueryFilter::all().where_clause();
        assert_eq!(clause, "1 = 1");
        assert!(binds.is_empty());
    }

    #[test]
    fn blank_dimensions_are_treated_as_unset() {
        let filter = QueryFilter {
            entity_type: Some(String::new()),
            event_type: Some("TASK_CREATED".to_string()),
            ..QueryFilter::default()
        };
        let (clause, binds) = filter.where_clause();
        assert_eq!(clause, "event_type = ?");
        assert_eq!(binds, vec![Value::Text("TASK_CREATED".to_string())]);
    }

    #[test]
    fn empty_entity_id_still_filters() {
        let (clause, binds) = QueryFilter::for_entity("widget", "").where_clause();
        assert_eq!(clause, "entity_type = ? AND entity_id = ?");
        assert_eq!(
            binds,
            vec![Value::Text("widget".to_string()), Value::Text(String::new())]
        );
    }

    #[test]
    fn set_dimensions_combine_in_fixed_order() {
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let filter = QueryFilter::for_entity("goal", "7")
            .with_event_type("GOAL_DEFINED")
            .since(since);

        let (clause, binds) = filter.where_clause();
        assert_eq!(
            clause,
            "entity_type = ? AND entity_id = ? AND event_type = ? AND timestamp >= ?"
        );
        assert_eq!(binds.len(), 4);
        assert_eq!(
            binds[3],
            Value::Text("2026-03-01T00:00:00.000000Z".to_string())
        );
    }

    #[test]
    fn limit_resolution() {
        assert_eq!(
            QueryFilter::all().effective_limit(DEFAULT_QUERY_LIMIT),
            Some(DEFAULT_QUERY_LIMIT)
        );
        assert_eq!(QueryFilter::all().limit(5).effective_limit(1000), Some(5));
        assert_eq!(QueryFilter::all().unbounded().effective_limit(1000), None);
        assert_eq!(QueryFilter::default().limit, QueryLimit::Default);
    }
}
