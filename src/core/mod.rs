// src/core/mod.rs

/// Static descriptions of the known external tools and PATH lookup.
pub mod catalog;

/// Typed errors of the scan pipeline and its stores.
pub mod error;

/// The scan state machine and its bounded worker pool.
pub mod executor;

/// Data structures shared across the pipeline: scan records, alerts and tool
/// outcomes.
pub mod models;

/// Completion hook and notification delivery.
pub mod notify;

/// Report persistence and rendering.
pub mod report;

/// Tool invocation and report aggregation.
pub mod scanner;

/// SQLite-backed scan ledger and alert sink.
pub mod store;
