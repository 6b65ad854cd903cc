//! Event-log domain model.
//!
//! # Responsibility
//! - Define the immutable event record every domain module is built from.
//! - Keep payloads as typed JSON documents checked at the store boundary.
//!
//! # Invariants
//! - An event never changes after it has been appended.
//! - Replay order is `sequence_id`, never `timestamp`.

pub mod event;
