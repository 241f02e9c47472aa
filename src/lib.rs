// src/lib.rs

//! Runs external security tools against a target, collects their output into
//! a report, and tracks every scan and its alerts in a small SQLite store.

pub mod app;
pub mod config;
pub mod core;
pub mod logging;

pub use crate::core::executor::{Collaborators, ExecutorSettings, ScanExecutor};
pub use crate::core::models::{AlertLevel, AlertRecord, ScanRecord, ScanStatus, StatusChange};
