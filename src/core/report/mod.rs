// src/core/report/mod.rs

pub mod renderer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::error::PublishError;
use crate::core::models::AlertLevel;
use crate::core::store::AlertSink;

pub use renderer::{DocumentRenderer, HtmlRenderer};

/// Path of the text report for `scan_id` inside `reports_dir`.
pub fn text_report_path(reports_dir: &Path, scan_id: &str) -> PathBuf {
    reports_dir.join(format!("{scan_id}_report.txt"))
}

/// Persists the aggregated text report and optionally renders it.
#[derive(Clone)]
pub struct ReportPublisher {
    reports_dir: PathBuf,
    title: String,
    renderer: Option<Arc<dyn DocumentRenderer>>,
    alerts: AlertSink,
}

impl ReportPublisher {
    /// Creates a publisher writing into `reports_dir`.
    ///
    /// # Arguments
    ///
    /// * `reports_dir` - Directory for report files, created on first publish.
    /// * `title` - Document title handed to the renderer.
    /// * `renderer` - Optional second format; `None` keeps only the text report.
    /// * `alerts` - Receives rendering failures.
    pub fn new(
        reports_dir: impl Into<PathBuf>,
        title: impl Into<String>,
        renderer: Option<Arc<dyn DocumentRenderer>>,
        alerts: AlertSink,
    ) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            title: title.into(),
            renderer,
            alerts,
        }
    }

    /// Writes `{scan_id}_report.txt` and returns the authoritative report location.
    ///
    /// When a renderer is configured and succeeds, the rendered document is the
    /// location. A rendering failure raises an Error alert and falls back to the
    /// text file. Failing to write the text file is the only error.
    pub async fn publish(&self, scan_id: &str, report_text: &str) -> Result<PathBuf, PublishError> {
        let text_path = text_report_path(&self.reports_dir, scan_id);
        let write_err = |source| PublishError::Write {
            path: text_path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.reports_dir).await.map_err(write_err)?;
        tokio::fs::write(&text_path, report_text).await.map_err(write_err)?;
        info!(scan_id, path = %text_path.display(), "Text report written.");

        let Some(renderer) = self.renderer.clone() else {
            return Ok(text_path);
        };

        let title = format!("{} {}", self.title, scan_id);
        let source = text_path.clone();
        let rendered = tokio::task::spawn_blocking(move || renderer.render_document(&title, &source))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()));

        match rendered {
            Ok(path) => {
                info!(scan_id, path = %path.display(), "Rendered report written.");
                Ok(path)
            }
            Err(e) => {
                warn!(scan_id, error = %e, "Rendering failed, keeping text report.");
                self.alerts
                    .raise(scan_id, AlertLevel::Error, format!("Report rendering failed: {e}"))
                    .await;
                Ok(text_path)
            }
        }
    }
}
