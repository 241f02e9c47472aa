// src/core/executor.rs

//! The scan state machine and the worker pool that drives it.
//!
//! `submit` records a scan as `Queued` and hands it to a bounded queue. A fixed
//! set of workers pull scans off the queue and own them until they reach a
//! terminal status:
//!
//! ```text
//! Queued -> Running -> Done   (report published, completion hook called)
//!                   -> Error  (anything escaping aggregation or publishing)
//! ```
//!
//! Only the worker that owns a scan writes its ledger record.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::error::{ScanError, StoreError, SubmitError};
use crate::core::models::{AlertLevel, ScanRecord, ScanStatus, StatusChange, SYSTEM_SOURCE};
use crate::core::notify::CompletionHook;
use crate::core::report::ReportPublisher;
use crate::core::scanner::ReportAggregator;
use crate::core::store::{AlertSink, ScanLedger};

const EVENT_CAPACITY: usize = 256;
const ID_ATTEMPTS: usize = 8;
/// With SQLite's own 5 s busy wait per attempt this rides out roughly half a
/// minute of lock contention.
const WRITE_ATTEMPTS: u32 = 6;
const WRITE_BACKOFF: Duration = Duration::from_millis(250);

/// Sizing of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 32,
        }
    }
}

/// Everything a scan touches while it runs.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: ScanLedger,
    pub alerts: AlertSink,
    pub aggregator: ReportAggregator,
    pub publisher: ReportPublisher,
    pub hook: Option<Arc<dyn CompletionHook>>,
}

struct Job {
    record: ScanRecord,
    notify_target: Option<String>,
}

#[derive(Clone)]
struct Pipeline {
    parts: Collaborators,
    events: broadcast::Sender<StatusChange>,
}

/// An 8-character random scan identifier.
fn new_scan_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

impl Pipeline {
    fn emit(&self, scan_id: &str, status: ScanStatus, report_path: Option<PathBuf>) {
        // No subscribers is fine.
        let _ = self.events.send(StatusChange {
            scan_id: scan_id.to_string(),
            status,
            report_path,
        });
    }

    async fn execute(&self, record: &ScanRecord) -> Result<PathBuf, ScanError> {
        let (report, _outcomes) = self
            .parts
            .aggregator
            .aggregate(&record.id, &record.target, &record.tools)
            .await;
        Ok(self.parts.publisher.publish(&record.id, &report).await?)
    }

    /// Writes a status transition, retrying while SQLite reports lock contention.
    async fn settle(
        &self,
        id: &str,
        status: ScanStatus,
        location: Option<&Path>,
    ) -> Result<ScanRecord, StoreError> {
        let mut backoff = WRITE_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.parts.ledger.advance(id, status, location).await {
                Err(e) if e.is_transient() && attempt < WRITE_ATTEMPTS => {
                    warn!(scan_id = %id, %status, attempt, error = %e, "Status write contended, retrying.");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn run(&self, job: Job) {
        let id = job.record.id.clone();
        let alerts = &self.parts.alerts;

        if let Err(e) = self.settle(&id, ScanStatus::Running, None).await {
            error!(scan_id = %id, error = %e, "Could not mark scan as running.");
            self.emit(&id, ScanStatus::Running, None);
            return self.fail(&id, e.into()).await;
        }
        self.emit(&id, ScanStatus::Running, None);
        info!(scan_id = %id, target = %job.record.target, "Scan running.");

        let body = {
            let this = self.clone();
            let record = job.record.clone();
            tokio::spawn(async move { this.execute(&record).await })
        };
        let result = match body.await {
            Ok(result) => result,
            Err(join) => Err(ScanError::Panicked(join.to_string())),
        };

        let location = match result {
            Ok(location) => location,
            Err(e) => return self.fail(&id, e).await,
        };
        let record = match self.settle(&id, ScanStatus::Done, Some(&location)).await {
            Ok(record) => record,
            Err(e) => return self.fail(&id, e.into()).await,
        };
        alerts
            .raise(
                &id,
                AlertLevel::Info,
                format!("Scan {id} completed, report: {}", location.display()),
            )
            .await;
        self.emit(&id, ScanStatus::Done, Some(location.clone()));

        if let Some(hook) = self.parts.hook.clone() {
            let notify_target = job.notify_target;
            let hooked = tokio::spawn(async move {
                hook.on_complete(&record, &location, notify_target.as_deref()).await
            })
            .await;
            if let Err(e) = hooked {
                error!(scan_id = %id, error = %e, "Completion hook panicked.");
            }
        }
    }

    /// Ends a scan in `Error`. The terminal event is emitted even when the
    /// ledger cannot be written, so no observer waits forever.
    async fn fail(&self, id: &str, cause: ScanError) {
        warn!(scan_id = %id, error = %cause, "Scan failed.");
        let written = match self.settle(id, ScanStatus::Error, None).await {
            // The Running write never landed.
            Err(StoreError::IllegalTransition {
                from: ScanStatus::Queued,
                ..
            }) => match self.settle(id, ScanStatus::Running, None).await {
                Ok(_) => self.settle(id, ScanStatus::Error, None).await,
                Err(e) => Err(e),
            },
            other => other,
        };
        if let Err(e) = written {
            error!(scan_id = %id, error = %e, "Could not mark scan as failed; ledger is stale.");
        }
        self.parts
            .alerts
            .raise(id, AlertLevel::Error, format!("Scan worker exception: {cause}"))
            .await;
        self.emit(id, ScanStatus::Error, None);
    }
}

async fn worker_loop(index: usize, queue: Arc<Mutex<mpsc::Receiver<Job>>>, pipeline: Pipeline) {
    debug!(worker = index, "Scan worker started.");
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else { break };
        pipeline.run(job).await;
    }
    debug!(worker = index, "Scan worker stopped.");
}

/// Accepts scan requests and runs them on a bounded pool of workers.
pub struct ScanExecutor {
    queue: Option<mpsc::Sender<Job>>,
    capacity: usize,
    pipeline: Pipeline,
    workers: Vec<JoinHandle<()>>,
}

impl ScanExecutor {
    /// Spawns the worker pool. Must be called from within a tokio runtime.
    pub fn start(parts: Collaborators, settings: ExecutorSettings) -> Self {
        let workers = settings.workers.max(1);
        let capacity = settings.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let pipeline = Pipeline { parts, events };

        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..workers)
            .map(|index| tokio::spawn(worker_loop(index, rx.clone(), pipeline.clone())))
            .collect();
        info!(workers, queue_capacity = capacity, "Scan executor started.");

        Self {
            queue: Some(tx),
            capacity,
            pipeline,
            workers: handles,
        }
    }

    /// Validates and enqueues a scan, returning its identifier without waiting.
    ///
    /// Rejected requests (empty target, no tools, full queue) leave no record
    /// behind.
    pub fn submit(
        &self,
        target: &str,
        tools: &[String],
        notify_target: Option<String>,
    ) -> Result<String, SubmitError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(SubmitError::EmptyTarget);
        }
        let tools: Vec<String> = tools
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        if tools.is_empty() {
            return Err(SubmitError::NoTools);
        }

        let queue = self.queue.as_ref().ok_or(SubmitError::Closed)?;
        let permit = match queue.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                self.pipeline.parts.alerts.blocking_raise(
                    SYSTEM_SOURCE,
                    AlertLevel::Warning,
                    format!("Rejected scan for {target}: queue full ({} pending)", self.capacity),
                );
                return Err(SubmitError::Saturated {
                    capacity: self.capacity,
                });
            }
            Err(mpsc::error::TrySendError::Closed(())) => return Err(SubmitError::Closed),
        };

        let record = self.create_record(target, tools)?;
        let id = record.id.clone();
        self.pipeline.emit(&id, ScanStatus::Queued, None);
        self.pipeline.parts.alerts.blocking_raise(
            &id,
            AlertLevel::Info,
            format!("Queued scan for {target} with {}", record.tools.join(",")),
        );
        permit.send(Job {
            record,
            notify_target: notify_target.filter(|t| !t.trim().is_empty()),
        });
        Ok(id)
    }

    fn create_record(&self, target: &str, tools: Vec<String>) -> Result<ScanRecord, StoreError> {
        let ledger = &self.pipeline.parts.ledger;
        let mut last = None;
        for _ in 0..ID_ATTEMPTS {
            let record = ScanRecord::queued(new_scan_id(), target, tools.clone());
            match ledger.create(&record) {
                Ok(()) => return Ok(record),
                Err(StoreError::Duplicate(id)) => {
                    debug!(scan_id = %id, "Scan id collision, drawing another.");
                    last = Some(StoreError::Duplicate(id));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| StoreError::Corrupt("could not allocate scan id".into())))
    }

    /// Receives every status change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.pipeline.events.subscribe()
    }

    /// Waits until `scan_id` reaches a terminal status and returns its record.
    ///
    /// `events` should be subscribed before the scan was submitted. If the
    /// worker reports a terminal status the ledger never received, this returns
    /// [`StoreError::Unrecorded`] instead of waiting forever.
    pub async fn wait_for_terminal(
        &self,
        events: &mut broadcast::Receiver<StatusChange>,
        scan_id: &str,
    ) -> Result<ScanRecord, StoreError> {
        loop {
            match self.read_record(scan_id).await {
                Ok(record) if record.status.is_terminal() => return Ok(record),
                Ok(_) => {}
                Err(e) if e.is_transient() => debug!(scan_id, error = %e, "Ledger busy while waiting."),
                Err(e) => return Err(e),
            }
            match events.recv().await {
                Ok(change) if change.scan_id == scan_id && change.status.is_terminal() => {
                    let record = self.read_record(scan_id).await?;
                    if record.status.is_terminal() {
                        return Ok(record);
                    }
                    return Err(StoreError::Unrecorded {
                        id: scan_id.to_string(),
                        status: change.status,
                    });
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.read_record(scan_id).await,
            }
        }
    }

    async fn read_record(&self, scan_id: &str) -> Result<ScanRecord, StoreError> {
        self.ledger()
            .lookup(scan_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(scan_id.to_string()))
    }

    pub fn ledger(&self) -> &ScanLedger {
        &self.pipeline.parts.ledger
    }

    /// Stops accepting scans and waits for queued and running ones to finish.
    pub async fn shutdown(mut self) {
        self.queue.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Scan worker ended abnormally.");
            }
        }
        info!("Scan executor stopped.");
    }
}
