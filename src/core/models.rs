// src/core/models.rs

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Alert source used for events that do not belong to a single scan.
pub const SYSTEM_SOURCE: &str = "system";

// --- Scan Lifecycle ---

/// The lifecycle status of a scan.
///
/// Transitions only move forward: `Queued -> Running -> {Done | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanStatus {
    /// Accepted and waiting for a free worker.
    Queued,
    /// A worker is running the scan's tools.
    Running,
    /// The report was published; `report_path` points at it.
    Done,
    /// Something outside the individual tools failed.
    Error,
}

impl ScanStatus {
    /// Returns `true` for `Done` and `Error`; no transition leaves these states.
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Done | ScanStatus::Error)
    }

    /// Whether the ledger may move a record from `self` to `next`.
    pub fn can_advance_to(self, next: ScanStatus) -> bool {
        matches!(
            (self, next),
            (ScanStatus::Queued, ScanStatus::Running)
                | (ScanStatus::Running, ScanStatus::Done)
                | (ScanStatus::Running, ScanStatus::Error)
        )
    }
}

/// The durable record of one scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// 8-character hex identifier, unique within the ledger.
    pub id: String,
    /// Host, address or URL handed to every tool as its only argument.
    pub target: String,
    /// Tool names in the order they run.
    pub tools: Vec<String>,
    pub status: ScanStatus,
    /// Submission time (UTC).
    pub created_at: DateTime<Utc>,
    /// Set if and only if `status` is `Done`.
    pub report_path: Option<PathBuf>,
}

impl ScanRecord {
    /// Builds a freshly submitted record in the `Queued` state.
    pub fn queued(id: impl Into<String>, target: impl Into<String>, tools: Vec<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            tools,
            status: ScanStatus::Queued,
            created_at: Utc::now(),
            report_path: None,
        }
    }
}

/// Emitted by the executor after every ledger transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub scan_id: String,
    /// The status just written.
    pub status: ScanStatus,
    /// The published report, only on `Done`.
    pub report_path: Option<PathBuf>,
}

// --- Alerts ---

/// Severity of an [`AlertRecord`]. Stored and serialized in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertLevel {
    /// Normal progress (queued, completed, notification sent).
    Info,
    /// Something was skipped or refused but nothing failed.
    Warning,
    /// A tool, the renderer, the notifier or the scan itself failed.
    Error,
}

/// One append-only operational event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Strictly increasing across the whole log.
    pub id: i64,
    pub time: DateTime<Utc>,
    /// The scan id, or [`SYSTEM_SOURCE`].
    pub source: String,
    pub level: AlertLevel,
    pub message: String,
}

// --- Tool Outcomes ---

/// How a single tool invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The tool ran to completion. Its exit code is not considered.
    Success,
    /// No executable with that name on `PATH`.
    NotFound,
    /// Killed after exceeding the time budget.
    TimedOut,
    /// Could not be started or waited on, with the OS error text.
    Failed(String),
}

/// The transient result of running one tool; discarded once the report is written.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool: String,
    /// Combined stdout/stderr. Always empty for `TimedOut`.
    pub output: String,
    pub kind: OutcomeKind,
    /// Wall time from spawn to outcome.
    pub elapsed: Duration,
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    /// A one-line human description of a non-successful outcome.
    pub fn failure_reason(&self, timeout: Duration) -> Option<String> {
        match &self.kind {
            OutcomeKind::Success => None,
            OutcomeKind::NotFound => Some("tool not found on PATH".to_string()),
            OutcomeKind::TimedOut => Some(format!("timed out after {}s", timeout.as_secs())),
            OutcomeKind::Failed(e) => Some(e.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_only_moves_forward() {
        assert!(ScanStatus::Queued.can_advance_to(ScanStatus::Running));
        assert!(ScanStatus::Running.can_advance_to(ScanStatus::Done));
        assert!(ScanStatus::Running.can_advance_to(ScanStatus::Error));

        assert!(!ScanStatus::Queued.can_advance_to(ScanStatus::Done));
        assert!(!ScanStatus::Done.can_advance_to(ScanStatus::Running));
        assert!(!ScanStatus::Error.can_advance_to(ScanStatus::Done));
        assert!(!ScanStatus::Running.can_advance_to(ScanStatus::Queued));
    }

    #[test]
    fn status_and_level_use_lowercase_names() {
        assert_eq!(ScanStatus::Running.to_string(), "running");
        assert_eq!(ScanStatus::from_str("done").unwrap(), ScanStatus::Done);
        assert_eq!(AlertLevel::Warning.as_ref(), "warning");
        assert_eq!(AlertLevel::from_str("error").unwrap(), AlertLevel::Error);
    }

    #[test]
    fn not_found_reason_mentions_not_found() {
        let outcome = ToolOutcome {
            tool: "nmap".into(),
            output: String::new(),
            kind: OutcomeKind::NotFound,
            elapsed: Duration::ZERO,
        };
        let reason = outcome.failure_reason(Duration::from_secs(120)).unwrap();
        assert!(reason.contains("not found"));
    }
}
