#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use scanrelay::core::notify::CompletionHook;
use scanrelay::core::report::{DocumentRenderer, ReportPublisher};
use scanrelay::core::scanner::ReportAggregator;
use scanrelay::core::store::{AlertSink, Database, ScanLedger};
use scanrelay::{Collaborators, ExecutorSettings, ScanExecutor, ScanRecord, ScanStatus, StatusChange};

pub const MISSING_TOOL: &str = "scanrelay-test-missing-tool";

/// Records every completion the executor reports.
#[derive(Default)]
pub struct RecordingHook {
    pub calls: Mutex<Vec<(String, PathBuf, Option<String>)>>,
}

#[async_trait]
impl CompletionHook for RecordingHook {
    async fn on_complete(&self, scan: &ScanRecord, report: &Path, notify_target: Option<&str>) {
        self.calls.lock().unwrap().push((
            scan.id.clone(),
            report.to_path_buf(),
            notify_target.map(str::to_string),
        ));
    }
}

pub struct Harness {
    pub executor: ScanExecutor,
    pub ledger: ScanLedger,
    pub alerts: AlertSink,
    pub hook: Arc<RecordingHook>,
    pub reports_dir: PathBuf,
    pub db_path: PathBuf,
    pub _dir: tempfile::TempDir,
}

pub struct HarnessOptions {
    pub timeout: Duration,
    pub settings: ExecutorSettings,
    pub renderer: Option<Arc<dyn DocumentRenderer>>,
    /// Replace the reports directory with a regular file so writes fail.
    pub unwritable_reports: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            settings: ExecutorSettings::default(),
            renderer: None,
            unwritable_reports: false,
        }
    }
}

pub fn harness(options: HarnessOptions) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let reports_dir = dir.path().join("reports");
    if options.unwritable_reports {
        std::fs::write(&reports_dir, "not a directory").expect("blocker file");
    }

    let db_path = dir.path().join("scanrelay.db");
    let db = Database::open(&db_path).expect("open db");
    let ledger = ScanLedger::new(db.clone());
    let alerts = AlertSink::new(db);
    let hook = Arc::new(RecordingHook::default());

    let executor = ScanExecutor::start(
        Collaborators {
            ledger: ledger.clone(),
            alerts: alerts.clone(),
            aggregator: ReportAggregator::new(alerts.clone(), options.timeout, "Scan Report"),
            publisher: ReportPublisher::new(&reports_dir, "Scan Report", options.renderer, alerts.clone()),
            hook: Some(hook.clone() as Arc<dyn CompletionHook>),
        },
        options.settings,
    );

    Harness {
        executor,
        ledger,
        alerts,
        hook,
        reports_dir,
        db_path,
        _dir: dir,
    }
}

/// Reads events until `scan_id` reports `Running`, returning its statuses so far.
pub async fn statuses_until_running(
    events: &mut broadcast::Receiver<StatusChange>,
    scan_id: &str,
) -> Vec<ScanStatus> {
    let mut seen = Vec::new();
    while seen.last() != Some(&ScanStatus::Running) {
        let change = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("scan did not start in time")
            .expect("event stream closed");
        if change.scan_id == scan_id {
            seen.push(change.status);
        }
    }
    seen
}

pub fn tools(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Collects status changes for `scan_id` until it reaches a terminal status.
pub async fn statuses_until_terminal(
    events: &mut broadcast::Receiver<StatusChange>,
    scan_id: &str,
) -> Vec<StatusChange> {
    let mut seen = Vec::new();
    loop {
        let change = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("scan did not finish in time")
            .expect("event stream closed");
        if change.scan_id != scan_id {
            continue;
        }
        let terminal = change.status.is_terminal();
        seen.push(change);
        if terminal {
            return seen;
        }
    }
}
