// src/core/store/alerts.rs

use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, Row};
use tracing::{error, info, warn};

use super::{format_time, off_runtime, parse_time, Database};
use crate::core::error::StoreError;
use crate::core::models::{AlertLevel, AlertRecord};

const SELECT_COLUMNS: &str = "SELECT id, time, source, level, message FROM alerts";

/// Append-only store of operational events.
#[derive(Clone)]
pub struct AlertSink {
    db: Database,
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_alert(
    (id, time, source, level, message): (i64, String, String, String, String),
) -> Result<AlertRecord, StoreError> {
    let level = AlertLevel::from_str(&level)
        .map_err(|_| StoreError::Corrupt(format!("alert {id}: bad level {level:?}")))?;
    Ok(AlertRecord {
        id,
        time: parse_time(&time)?,
        source,
        level,
        message,
    })
}

impl AlertSink {
    /// Wraps a database handle; clones share it.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Appends an alert and mirrors it to the tracing log at the same level.
    pub fn record(
        &self,
        source: &str,
        level: AlertLevel,
        message: impl Into<String>,
    ) -> Result<AlertRecord, StoreError> {
        let message = message.into();
        match level {
            AlertLevel::Info => info!(source = %source, "{message}"),
            AlertLevel::Warning => warn!(source = %source, "{message}"),
            AlertLevel::Error => error!(source = %source, "{message}"),
        }

        // Stamped under the connection lock so id order and time order agree.
        let (id, time) = self.db.with_conn(|conn| {
            let time = Utc::now();
            conn.execute(
                "INSERT INTO alerts (time, source, level, message) VALUES (?1, ?2, ?3, ?4)",
                params![format_time(&time), source, level.as_ref(), message],
            )?;
            Ok((conn.last_insert_rowid(), time))
        })?;

        Ok(AlertRecord {
            id,
            time,
            source: source.to_string(),
            level,
            message,
        })
    }

    /// Like [`AlertSink::record`], but a storage failure is only logged.
    ///
    /// Used inside the scan pipeline, where losing an alert must not change the
    /// outcome of the scan. The write runs on the blocking pool.
    pub async fn raise(&self, source: &str, level: AlertLevel, message: impl Into<String>) {
        let sink = self.clone();
        let owned = source.to_string();
        let message = message.into();
        if let Err(e) = off_runtime(move || sink.record(&owned, level, message)).await {
            error!(source = %source, error = %e, "Failed to persist alert.");
        }
    }

    /// [`AlertSink::raise`] for synchronous callers.
    pub fn blocking_raise(&self, source: &str, level: AlertLevel, message: impl Into<String>) {
        if let Err(e) = self.record(source, level, message) {
            error!(source = %source, error = %e, "Failed to persist alert.");
        }
    }

    /// The most recent alerts first.
    pub fn list(&self, limit: usize) -> Result<Vec<AlertRecord>, StoreError> {
        self.query(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"), params![limit as i64])
    }

    /// Every alert for one source, oldest first.
    pub fn for_source(&self, source: &str) -> Result<Vec<AlertRecord>, StoreError> {
        self.query(&format!("{SELECT_COLUMNS} WHERE source = ?1 ORDER BY id ASC"), params![source])
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<AlertRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, alert_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(into_alert).collect()
        })
    }
}
