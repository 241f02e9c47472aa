// src/core/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::core::models::ScanStatus;

/// Failures of the SQLite-backed ledger and alert sink.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,

    #[error("scan {0} not found")]
    NotFound(String),

    #[error("scan {0} already exists")]
    Duplicate(String),

    #[error("scan {id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: ScanStatus,
        to: ScanStatus,
    },

    #[error("scan {id}: report location must be set exactly when status is done (status {status})")]
    LocationMismatch { id: String, status: ScanStatus },

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage task failed: {0}")]
    Background(String),

    #[error("scan {id} ended {status} but the ledger could not record it")]
    Unrecorded { id: String, status: ScanStatus },
}

impl StoreError {
    /// `true` when SQLite reported lock contention, so the same call may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }
}

/// Failures of a document renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("source report not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("render I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures that make publishing a report impossible.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a submission was refused. No state exists for a refused submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("at least one tool is required")]
    NoTools,

    #[error("scan queue is full ({capacity} pending), try again later")]
    Saturated { capacity: usize },

    #[error("scan executor is shut down")]
    Closed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Anything that escapes the execution body of a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scan task panicked: {0}")]
    Panicked(String),
}
