// src/core/store/ledger.rs

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use super::{format_time, off_runtime, parse_time, Database};
use crate::core::error::StoreError;
use crate::core::models::{ScanRecord, ScanStatus};

const SELECT_COLUMNS: &str = "SELECT id, target, tools, status, created_at, report_path FROM scans";

/// Durable record of every scan and its current status.
#[derive(Clone)]
pub struct ScanLedger {
    db: Database,
}

/// A `scans` row exactly as stored, before parsing.
struct RawScanRow {
    id: String,
    target: String,
    tools: String,
    status: String,
    created_at: String,
    report_path: Option<String>,
}

impl RawScanRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            target: row.get(1)?,
            tools: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            report_path: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<ScanRecord, StoreError> {
        let tools: Vec<String> = serde_json::from_str(&self.tools)
            .map_err(|e| StoreError::Corrupt(format!("scan {}: bad tool list: {e}", self.id)))?;
        let status = ScanStatus::from_str(&self.status)
            .map_err(|_| StoreError::Corrupt(format!("scan {}: bad status {:?}", self.id, self.status)))?;
        Ok(ScanRecord {
            created_at: parse_time(&self.created_at)?,
            report_path: self.report_path.filter(|p| !p.is_empty()).map(PathBuf::from),
            id: self.id,
            target: self.target,
            tools,
            status,
        })
    }
}

fn fetch(conn: &Connection, id: &str) -> Result<Option<ScanRecord>, StoreError> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
    conn.query_row(&sql, params![id], RawScanRow::from_row)
        .optional()?
        .map(RawScanRow::into_record)
        .transpose()
}

impl ScanLedger {
    /// Wraps a database handle; clones share it.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a new record. An existing id is never overwritten.
    pub fn create(&self, record: &ScanRecord) -> Result<(), StoreError> {
        let tools = serde_json::to_string(&record.tools)
            .map_err(|e| StoreError::Corrupt(format!("unserializable tool list: {e}")))?;
        let report_path = record.report_path.as_ref().map(|p| p.display().to_string());

        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO scans (id, target, tools, status, created_at, report_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.target,
                    tools,
                    record.status.as_ref(),
                    format_time(&record.created_at),
                    report_path,
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Err(StoreError::Duplicate(record.id.clone()))
                }
                Err(e) => Err(e.into()),
            }
        })?;
        debug!(scan_id = %record.id, status = %record.status, "Scan record created.");
        Ok(())
    }

    /// Moves a record forward in its lifecycle and returns the updated record.
    ///
    /// `report_path` must be `Some` exactly when `status` is `Done`. The check of
    /// the current status and the write happen in one transaction.
    pub fn update_status(
        &self,
        id: &str,
        status: ScanStatus,
        report_path: Option<&Path>,
    ) -> Result<ScanRecord, StoreError> {
        if (status == ScanStatus::Done) != report_path.is_some() {
            return Err(StoreError::LocationMismatch {
                id: id.to_string(),
                status,
            });
        }
        let report_path = report_path.map(|p| p.display().to_string());

        let updated = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = fetch(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if !current.status.can_advance_to(status) {
                return Err(StoreError::IllegalTransition {
                    id: id.to_string(),
                    from: current.status,
                    to: status,
                });
            }
            tx.execute(
                "UPDATE scans SET status = ?1, report_path = ?2 WHERE id = ?3",
                params![status.as_ref(), report_path, id],
            )?;
            let updated = fetch(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            tx.commit()?;
            Ok(updated)
        })?;
        debug!(scan_id = %id, status = %status, "Scan status updated.");
        Ok(updated)
    }

    /// [`ScanLedger::update_status`] on the blocking pool, for async callers.
    pub async fn advance(
        &self,
        id: &str,
        status: ScanStatus,
        report_path: Option<&Path>,
    ) -> Result<ScanRecord, StoreError> {
        let ledger = self.clone();
        let id = id.to_string();
        let report_path = report_path.map(Path::to_path_buf);
        off_runtime(move || ledger.update_status(&id, status, report_path.as_deref())).await
    }

    /// Looks up one scan by id. `None` if it was never created.
    pub fn get(&self, id: &str) -> Result<Option<ScanRecord>, StoreError> {
        self.db.with_conn(|conn| fetch(conn, id))
    }

    /// [`ScanLedger::get`] on the blocking pool.
    pub async fn lookup(&self, id: &str) -> Result<Option<ScanRecord>, StoreError> {
        let ledger = self.clone();
        let id = id.to_string();
        off_runtime(move || ledger.get(&id)).await
    }

    /// The most recently created scans first.
    pub fn list(&self, limit: usize) -> Result<Vec<ScanRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit as i64], RawScanRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(RawScanRow::into_record).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ScanLedger {
        ScanLedger::new(Database::open_in_memory().unwrap())
    }

    fn queued(id: &str) -> ScanRecord {
        ScanRecord::queued(id, "example.com", vec!["nmap".into(), "whois".into()])
    }

    #[test]
    fn create_then_get_returns_the_same_record() {
        let ledger = ledger();
        let record = queued("abcd1234");
        ledger.create(&record).unwrap();

        let stored = ledger.get("abcd1234").unwrap().unwrap();
        assert_eq!(stored.target, "example.com");
        assert_eq!(stored.tools, vec!["nmap", "whois"]);
        assert_eq!(stored.status, ScanStatus::Queued);
        assert_eq!(stored.report_path, None);
        assert_eq!(ledger.get("missing0").unwrap(), None);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let ledger = ledger();
        ledger.create(&queued("dup00001")).unwrap();
        let err = ledger.create(&queued("dup00001")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == "dup00001"));
    }

    #[test]
    fn full_lifecycle_sets_location_only_when_done() {
        let ledger = ledger();
        ledger.create(&queued("life0001")).unwrap();

        let running = ledger.update_status("life0001", ScanStatus::Running, None).unwrap();
        assert_eq!(running.status, ScanStatus::Running);
        assert_eq!(running.report_path, None);

        let done = ledger
            .update_status("life0001", ScanStatus::Done, Some(Path::new("/tmp/life0001_report.txt")))
            .unwrap();
        assert_eq!(done.status, ScanStatus::Done);
        assert_eq!(done.report_path, Some(PathBuf::from("/tmp/life0001_report.txt")));
    }

    #[test]
    fn done_requires_a_location_and_others_forbid_one() {
        let ledger = ledger();
        ledger.create(&queued("loc00001")).unwrap();
        ledger.update_status("loc00001", ScanStatus::Running, None).unwrap();

        let err = ledger.update_status("loc00001", ScanStatus::Done, None).unwrap_err();
        assert!(matches!(err, StoreError::LocationMismatch { .. }));

        let err = ledger
            .update_status("loc00001", ScanStatus::Error, Some(Path::new("x")))
            .unwrap_err();
        assert!(matches!(err, StoreError::LocationMismatch { .. }));
    }

    #[test]
    fn terminal_records_cannot_move() {
        let ledger = ledger();
        ledger.create(&queued("term0001")).unwrap();
        ledger.update_status("term0001", ScanStatus::Running, None).unwrap();
        ledger.update_status("term0001", ScanStatus::Error, None).unwrap();

        let err = ledger.update_status("term0001", ScanStatus::Running, None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IllegalTransition { from: ScanStatus::Error, to: ScanStatus::Running, .. }
        ));
        assert_eq!(ledger.get("term0001").unwrap().unwrap().status, ScanStatus::Error);
    }

    #[test]
    fn skipping_running_is_rejected() {
        let ledger = ledger();
        ledger.create(&queued("skip0001")).unwrap();
        let err = ledger
            .update_status("skip0001", ScanStatus::Done, Some(Path::new("r.txt")))
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn async_variants_use_the_same_rules() {
        let ledger = ledger();
        ledger.create(&queued("async001")).unwrap();

        let running = ledger.advance("async001", ScanStatus::Running, None).await.unwrap();
        assert_eq!(running.status, ScanStatus::Running);
        let err = ledger.advance("async001", ScanStatus::Queued, None).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        assert_eq!(ledger.lookup("async001").await.unwrap(), Some(running));
    }

    #[test]
    fn a_locked_database_is_a_transient_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scans.db");
        let ledger = ScanLedger::new(Database::open(&path).unwrap());
        ledger.create(&queued("lock0001")).unwrap();

        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE;").unwrap();
        let err = ledger.update_status("lock0001", ScanStatus::Running, None).unwrap_err();
        assert!(err.is_transient(), "{err}");
        other.execute_batch("COMMIT;").unwrap();

        let err = ledger.update_status("lock0001", ScanStatus::Done, None).unwrap_err();
        assert!(!err.is_transient());
        ledger.update_status("lock0001", ScanStatus::Running, None).unwrap();
    }

    #[test]
    fn unknown_id_is_not_found() {
        let err = ledger().update_status("nope0000", ScanStatus::Running, None).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn list_returns_newest_first_and_honours_limit() {
        let ledger = ledger();
        for id in ["first001", "second01", "third001"] {
            ledger.create(&queued(id)).unwrap();
        }
        let ids: Vec<String> = ledger.list(2).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["third001", "second01"]);
    }
}
