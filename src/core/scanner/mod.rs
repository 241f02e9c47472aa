// src/core/scanner/mod.rs

// Runs the requested tools one after another and builds the text report.
pub mod tool_invoker;

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument};

use crate::core::models::{AlertLevel, ToolOutcome};
use crate::core::store::AlertSink;

/// Canonical per-tool time budget.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

const SECTION_RULE: &str = "============================================================";
const HEADER_RULE: &str = "------------------------------------------------------------";

/// Sequentially invokes each tool of a scan and concatenates their output.
#[derive(Clone)]
pub struct ReportAggregator {
    alerts: AlertSink,
    timeout: Duration,
    title: String,
}

impl ReportAggregator {
    pub fn new(alerts: AlertSink, timeout: Duration, title: impl Into<String>) -> Self {
        Self {
            alerts,
            timeout,
            title: title.into(),
        }
    }

    /// Runs every tool in `tools`, in order, against `target`.
    ///
    /// A failing tool gets an inline `[ERROR]` line in its section and an Error
    /// alert for `scan_id`; the remaining tools still run. Returns once every
    /// tool has an outcome.
    #[instrument(skip(self, tools), fields(tool_count = tools.len()))]
    pub async fn aggregate(
        &self,
        scan_id: &str,
        target: &str,
        tools: &[String],
    ) -> (String, Vec<ToolOutcome>) {
        let mut report = String::new();
        let _ = write!(
            report,
            "{}\nID: {}\nTarget: {}\nTools: {}\nTime: {}\n\n",
            self.title,
            scan_id,
            target,
            tools.join(","),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let mut outcomes = Vec::with_capacity(tools.len());
        for tool in tools {
            let _ = write!(report, "{SECTION_RULE}\nTOOL: {tool}\n{HEADER_RULE}\n");

            let outcome = tool_invoker::invoke(tool, target, self.timeout).await;
            match outcome.failure_reason(self.timeout) {
                None => {
                    report.push_str(&outcome.output);
                    if !outcome.output.is_empty() && !outcome.output.ends_with('\n') {
                        report.push('\n');
                    }
                }
                Some(reason) => {
                    let _ = writeln!(report, "[ERROR] Running {tool}: {reason}");
                    self.alerts
                        .raise(scan_id, AlertLevel::Error, format!("Tool {tool} error: {reason}"))
                        .await;
                }
            }
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        let elapsed_ms: u128 = outcomes.iter().map(|o| o.elapsed.as_millis()).sum();
        info!(scan_id, failed, elapsed_ms = elapsed_ms as u64, "All tools finished.");
        (report, outcomes)
    }
}
