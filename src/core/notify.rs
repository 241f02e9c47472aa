// src/core/notify.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::core::models::{AlertLevel, ScanRecord};
use crate::core::store::AlertSink;

/// Called once a scan reaches `Done`. Never called for scans that end in `Error`.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_complete(&self, scan: &ScanRecord, report: &Path, notify_target: Option<&str>);
}

/// Delivers a message with attachments. Transport is up to the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether delivery succeeded and a short status message.
    async fn send_notification(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> (bool, String);
}

// --- Outbox Notifier ---

#[derive(Debug, Serialize)]
struct OutboxMessage<'a> {
    created_at: String,
    from: Option<&'a str>,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
    attachments: Vec<String>,
}

/// Spools each message as a JSON file for an external mailer to deliver.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    outbox_dir: PathBuf,
    sender: Option<String>,
}

impl OutboxNotifier {
    pub fn new(outbox_dir: impl Into<PathBuf>, sender: Option<String>) -> Self {
        Self {
            outbox_dir: outbox_dir.into(),
            sender,
        }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send_notification(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> (bool, String) {
        let now = Utc::now();
        let message = OutboxMessage {
            created_at: now.to_rfc3339(),
            from: self.sender.as_deref(),
            to: recipient,
            subject,
            body,
            attachments: attachments.iter().map(|p| p.display().to_string()).collect(),
        };
        let json = match serde_json::to_vec_pretty(&message) {
            Ok(json) => json,
            Err(e) => return (false, format!("could not encode message: {e}")),
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.outbox_dir).await {
            return (false, format!("outbox {} unavailable: {e}", self.outbox_dir.display()));
        }
        let file = self
            .outbox_dir
            .join(format!("{}-{}.json", now.format("%Y%m%dT%H%M%S%.6f"), uuid::Uuid::new_v4().simple()));
        match tokio::fs::write(&file, json).await {
            Ok(()) => {
                debug!(path = %file.display(), "Notification spooled.");
                (true, "OK".to_string())
            }
            Err(e) => (false, format!("could not write {}: {e}", file.display())),
        }
    }
}

// --- Notification Hook ---

/// Completion hook that mails the report to the resolved recipient.
///
/// The recipient is the submission's notify target, else the configured
/// default recipient, else the configured sender.
#[derive(Clone)]
pub struct NotificationHook {
    notifier: Option<Arc<dyn Notifier>>,
    default_recipient: Option<String>,
    sender: Option<String>,
    subject_prefix: String,
    alerts: AlertSink,
}

impl NotificationHook {
    pub fn new(
        notifier: Option<Arc<dyn Notifier>>,
        default_recipient: Option<String>,
        sender: Option<String>,
        subject_prefix: impl Into<String>,
        alerts: AlertSink,
    ) -> Self {
        Self {
            notifier,
            default_recipient,
            sender,
            subject_prefix: subject_prefix.into(),
            alerts,
        }
    }

    fn resolve_recipient<'a>(&'a self, notify_target: Option<&'a str>) -> Option<&'a str> {
        [notify_target, self.default_recipient.as_deref(), self.sender.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|r| !r.is_empty())
    }
}

#[async_trait]
impl CompletionHook for NotificationHook {
    async fn on_complete(&self, scan: &ScanRecord, report: &Path, notify_target: Option<&str>) {
        let Some(recipient) = self.resolve_recipient(notify_target) else {
            self.alerts
                .raise(&scan.id, AlertLevel::Warning, "No recipient configured; notification skipped.")
                .await;
            return;
        };
        let Some(notifier) = &self.notifier else {
            self.alerts
                .raise(&scan.id, AlertLevel::Warning, "No notifier configured; notification skipped.")
                .await;
            return;
        };

        let subject = format!("{} {}", self.subject_prefix, scan.id);
        let body = format!(
            "Scan {} finished. Report attached.\n\nTarget: {}\nTools: {}",
            scan.id,
            scan.target,
            scan.tools.join(", ")
        );
        let attachments = if tokio::fs::try_exists(report).await.unwrap_or(false) {
            vec![report.to_path_buf()]
        } else {
            Vec::new()
        };

        let (ok, message) = notifier
            .send_notification(recipient, &subject, &body, &attachments)
            .await;
        if ok {
            self.alerts
                .raise(&scan.id, AlertLevel::Info, format!("Notification sent to {recipient}"))
                .await;
        } else {
            self.alerts
                .raise(&scan.id, AlertLevel::Error, format!("Notification failed: {message}"))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::Database;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, Vec<PathBuf>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_notification(
            &self,
            recipient: &str,
            subject: &str,
            _body: &str,
            attachments: &[PathBuf],
        ) -> (bool, String) {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), subject.to_string(), attachments.to_vec()));
            if self.fail {
                (false, "relay refused".to_string())
            } else {
                (true, "OK".to_string())
            }
        }
    }

    fn scan() -> ScanRecord {
        ScanRecord::queued("hook0001", "example.com", vec!["nmap".into()])
    }

    fn alerts() -> AlertSink {
        AlertSink::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn submission_target_wins_over_configured_recipients() {
        let notifier = Arc::new(RecordingNotifier::default());
        let alerts = alerts();
        let hook = NotificationHook::new(
            Some(notifier.clone() as Arc<dyn Notifier>),
            Some("ops@example.com".into()),
            Some("sender@example.com".into()),
            "Scan Report",
            alerts.clone(),
        );
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("hook0001_report.txt");
        std::fs::write(&report, "r").unwrap();

        hook.on_complete(&scan(), &report, Some("me@example.com")).await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "me@example.com");
        assert_eq!(sent[0].1, "Scan Report hook0001");
        assert_eq!(sent[0].2, vec![report.clone()]);
        let recorded = alerts.for_source("hook0001").unwrap();
        assert_eq!(recorded[0].message, "Notification sent to me@example.com");
    }

    #[tokio::test]
    async fn falls_back_to_sender_and_skips_missing_attachment() {
        let notifier = Arc::new(RecordingNotifier::default());
        let hook = NotificationHook::new(
            Some(notifier.clone() as Arc<dyn Notifier>),
            None,
            Some("sender@example.com".into()),
            "Scan Report",
            alerts(),
        );

        hook.on_complete(&scan(), Path::new("/nonexistent/hook0001_report.txt"), Some("  "))
            .await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent[0].0, "sender@example.com");
        assert!(sent[0].2.is_empty());
    }

    #[tokio::test]
    async fn no_recipient_is_a_warning_not_an_error() {
        let notifier = Arc::new(RecordingNotifier::default());
        let alerts = alerts();
        let hook = NotificationHook::new(Some(notifier.clone() as Arc<dyn Notifier>), None, None, "Scan Report", alerts.clone());

        hook.on_complete(&scan(), Path::new("r.txt"), None).await;

        assert!(notifier.sent.lock().unwrap().is_empty());
        let recorded = alerts.for_source("hook0001").unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].level, AlertLevel::Warning);
    }

    #[tokio::test]
    async fn failed_delivery_raises_an_error_alert() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let alerts = alerts();
        let hook = NotificationHook::new(Some(notifier as Arc<dyn Notifier>), Some("ops@example.com".into()), None, "Scan Report", alerts.clone());

        hook.on_complete(&scan(), Path::new("r.txt"), None).await;

        let recorded = alerts.for_source("hook0001").unwrap();
        assert_eq!(recorded[0].level, AlertLevel::Error);
        assert_eq!(recorded[0].message, "Notification failed: relay refused");
    }

    #[tokio::test]
    async fn outbox_notifier_spools_a_json_message() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = OutboxNotifier::new(dir.path().join("outbox"), Some("sender@example.com".into()));

        let (ok, _) = notifier
            .send_notification("ops@example.com", "Scan Report x", "body", &[PathBuf::from("/r.txt")])
            .await;
        assert!(ok);

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("outbox")).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let raw = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["to"], "ops@example.com");
        assert_eq!(json["from"], "sender@example.com");
        assert_eq!(json["attachments"][0], "/r.txt");
    }
}
