// src/app.rs

use std::io::Write;
use std::sync::Arc;

use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing::info;

use crate::config::Config;
use crate::core::catalog;
use crate::core::executor::{Collaborators, ScanExecutor};
use crate::core::models::{ScanRecord, ScanStatus};
use crate::core::notify::{CompletionHook, NotificationHook, Notifier, OutboxNotifier};
use crate::core::report::{DocumentRenderer, HtmlRenderer, ReportPublisher};
use crate::core::scanner::ReportAggregator;
use crate::core::store::{AlertSink, Database, ScanLedger};

/// Opened stores plus the configuration they were opened with.
pub struct App {
    pub config: Config,
    pub ledger: ScanLedger,
    pub alerts: AlertSink,
}

impl App {
    /// Creates the data and report directories and opens the database.
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .wrap_err_with(|| format!("cannot create data dir {}", config.data_dir.display()))?;
        if let Some(parent) = config.database.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("cannot create database dir {}", parent.display()))?;
        }
        let db = Database::open(&config.database)
            .wrap_err_with(|| format!("cannot open database {}", config.database.display()))?;
        Ok(Self {
            ledger: ScanLedger::new(db.clone()),
            alerts: AlertSink::new(db),
            config,
        })
    }

    /// Wires the pipeline from the configuration and starts its workers.
    pub fn start_executor(&self) -> ScanExecutor {
        let cfg = &self.config;
        let renderer: Option<Arc<dyn DocumentRenderer>> = if cfg.render_html {
            Some(Arc::new(HtmlRenderer))
        } else {
            None
        };
        let notifier: Option<Arc<dyn Notifier>> = cfg.notify.outbox_dir.as_ref().map(|dir| {
            Arc::new(OutboxNotifier::new(dir.clone(), cfg.notify.sender.clone())) as Arc<dyn Notifier>
        });
        let hook: Arc<dyn CompletionHook> = Arc::new(NotificationHook::new(
            notifier,
            cfg.notify.default_recipient.clone(),
            cfg.notify.sender.clone(),
            cfg.report_title.clone(),
            self.alerts.clone(),
        ));

        ScanExecutor::start(
            Collaborators {
                ledger: self.ledger.clone(),
                alerts: self.alerts.clone(),
                aggregator: ReportAggregator::new(self.alerts.clone(), cfg.tool_timeout, cfg.report_title.clone()),
                publisher: ReportPublisher::new(
                    cfg.reports_dir.clone(),
                    cfg.report_title.clone(),
                    renderer,
                    self.alerts.clone(),
                ),
                hook: Some(hook),
            },
            cfg.executor,
        )
    }

    /// Submits one scan, waits for it to finish and prints the outcome.
    ///
    /// Uses the configured default tools when `tools` is empty. Returns the
    /// final record; a scan ending in `Error` is reported as an error.
    pub async fn run_scan(
        &self,
        out: &mut impl Write,
        target: &str,
        tools: &[String],
        notify: Option<String>,
    ) -> Result<ScanRecord> {
        let tools = if tools.is_empty() {
            self.config.default_tools.clone()
        } else {
            tools.to_vec()
        };

        let executor = self.start_executor();
        let mut events = executor.subscribe();
        let scan_id = executor.submit(target, &tools, notify)?;
        writeln!(out, "Scan started: {scan_id}")?;
        info!(scan_id = %scan_id, "Waiting for scan to finish.");

        let record = executor.wait_for_terminal(&mut events, &scan_id).await?;
        executor.shutdown().await;

        match (&record.status, &record.report_path) {
            (ScanStatus::Done, Some(path)) => {
                writeln!(out, "Scan {scan_id} done, report: {}", path.display())?;
                Ok(record)
            }
            _ => {
                writeln!(out, "Scan {scan_id} failed; see `scanrelay show {scan_id}`")?;
                Err(eyre!("scan {scan_id} ended with status {}", record.status))
            }
        }
    }

    /// Prints one line per scan, newest first.
    ///
    /// # Arguments
    ///
    /// * `out` - Where the table is written.
    /// * `limit` - Maximum number of scans shown.
    pub fn list_scans(&self, out: &mut impl Write, limit: usize) -> Result<()> {
        let scans = self.ledger.list(limit)?;
        if scans.is_empty() {
            writeln!(out, "No scans recorded.")?;
            return Ok(());
        }
        writeln!(out, "{:<8}  {:<7}  {:<20}  {:<24}  REPORT", "ID", "STATUS", "CREATED", "TARGET")?;
        for scan in scans {
            writeln!(
                out,
                "{:<8}  {:<7}  {:<20}  {:<24}  {}",
                scan.id,
                scan.status,
                scan.created_at.format("%Y-%m-%d %H:%M:%S"),
                scan.target,
                scan.report_path.map(|p| p.display().to_string()).unwrap_or_default(),
            )?;
        }
        Ok(())
    }

    /// Prints a scan's record followed by its alerts in event order.
    pub fn show_scan(&self, out: &mut impl Write, scan_id: &str) -> Result<()> {
        let scan = self
            .ledger
            .get(scan_id)?
            .ok_or_else(|| eyre!("no scan with id {scan_id}"))?;
        writeln!(out, "ID:      {}", scan.id)?;
        writeln!(out, "Target:  {}", scan.target)?;
        writeln!(out, "Tools:   {}", scan.tools.join(", "))?;
        writeln!(out, "Status:  {}", scan.status)?;
        writeln!(out, "Created: {}", scan.created_at.to_rfc3339())?;
        if let Some(path) = &scan.report_path {
            writeln!(out, "Report:  {}", path.display())?;
        }
        writeln!(out)?;
        for alert in self.alerts.for_source(scan_id)? {
            writeln!(
                out,
                "{}  {:<7}  {}",
                alert.time.format("%Y-%m-%d %H:%M:%S"),
                alert.level,
                alert.message
            )?;
        }
        Ok(())
    }

    /// Prints the most recent alerts, as a table or as a JSON array when `json` is set.
    pub fn list_alerts(&self, out: &mut impl Write, limit: usize, json: bool) -> Result<()> {
        let alerts = self.alerts.list(limit)?;
        if json {
            serde_json::to_writer_pretty(&mut *out, &alerts)?;
            writeln!(out)?;
            return Ok(());
        }
        for alert in alerts {
            writeln!(
                out,
                "{:>6}  {}  {:<8}  {:<7}  {}",
                alert.id,
                alert.time.format("%Y-%m-%d %H:%M:%S"),
                alert.source,
                alert.level,
                alert.message
            )?;
        }
        Ok(())
    }

    /// Lists the configured default tools with their catalog entry and PATH status.
    pub fn list_tools(&self, out: &mut impl Write) -> Result<()> {
        for name in &self.config.default_tools {
            let location = catalog::locate_on_path(name)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not found".to_string());
            match catalog::get_tool_detail(name) {
                Some(detail) => writeln!(
                    out,
                    "{:<10}  {:<7}  {:<30}  {}",
                    name, detail.category.to_string(), location, detail.summary
                )?,
                None => writeln!(out, "{:<10}  {:<7}  {}", name, "-", location)?,
            }
        }
        Ok(())
    }
}
