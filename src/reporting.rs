use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Database;

/// Context recorded for every failure in the capture flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub occurred_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub classification: String,
    pub retry_count: u32,
    pub detail: String,
}

impl ErrorReport {
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        classification: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            occurred_at: Utc::now(),
            session_id: None,
            endpoint: endpoint.into(),
            method: method.into(),
            classification: classification.into(),
            retry_count: 0,
            detail: detail.into(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Fire-and-forget sink for failure reports. Implementations must return
/// immediately and swallow their own failures.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: ErrorReport);
}

#[derive(Debug, Clone, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, report: ErrorReport) {
        log::warn!(
            "capture failure [{}] {} {} retries={} session={}: {}",
            report.classification,
            report.method,
            report.endpoint,
            report.retry_count,
            report.session_id.as_deref().unwrap_or("-"),
            report.detail
        );
    }
}

/// Logs each report and appends it to the SQLite failure journal in the background.
#[derive(Clone)]
pub struct JournalReporter {
    db: Database,
}

impl JournalReporter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl ErrorReporter for JournalReporter {
    fn report(&self, report: ErrorReport) {
        LogReporter.report(report.clone());

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("no async runtime; failure report for {} not journaled", report.endpoint);
            return;
        };

        let db = self.db.clone();
        runtime.spawn(async move {
            if let Err(err) = db.insert_failure_report(&report).await {
                log::debug!("failed to journal failure report: {err:#}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn journal_reporter_persists_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("journal.sqlite3")).unwrap();
        let reporter = JournalReporter::new(db.clone());

        reporter.report(
            ErrorReport::new("recognize", "POST", "api-error", "HTTP 502")
                .with_session("abc")
                .with_retries(3),
        );

        let mut reports = Vec::new();
        for _ in 0..50 {
            reports = db.recent_failure_reports(5).await.unwrap();
            if !reports.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].session_id.as_deref(), Some("abc"));
        assert_eq!(reports[0].classification, "api-error");
        assert_eq!(reports[0].retry_count, 3);
    }

    #[test]
    fn journal_reporter_without_runtime_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("journal.sqlite3")).unwrap();
        JournalReporter::new(db).report(ErrorReport::new("upload", "PUT", "api-error", "offline"));
    }
}
