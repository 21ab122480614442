use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

use crate::db::{
    helpers::{parse_datetime, to_i64, to_u32},
    Database,
};
use crate::reporting::ErrorReport;

/// Rows kept after each insert.
pub const FAILURE_JOURNAL_CAPACITY: usize = 500;
pub const FAILURE_JOURNAL_MAX_AGE_DAYS: i64 = 30;

fn prune(conn: &Connection, keep: usize, cutoff: DateTime<Utc>) -> Result<usize> {
    let expired = conn
        .execute(
            "DELETE FROM failure_reports WHERE occurred_at < ?1",
            params![cutoff.to_rfc3339()],
        )
        .with_context(|| "failed to prune expired failure reports")?;
    let overflow = conn
        .execute(
            "DELETE FROM failure_reports WHERE id NOT IN (
                SELECT id FROM failure_reports ORDER BY occurred_at DESC, id DESC LIMIT ?1
            )",
            params![to_i64(keep as u64)?],
        )
        .with_context(|| "failed to trim failure journal")?;
    Ok(expired + overflow)
}

impl Database {
    pub async fn insert_failure_report(&self, report: &ErrorReport) -> Result<()> {
        let record = report.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO failure_reports (
                    occurred_at,
                    session_id,
                    endpoint,
                    method,
                    classification,
                    retry_count,
                    detail
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.occurred_at.to_rfc3339(),
                    record.session_id,
                    record.endpoint,
                    record.method,
                    record.classification,
                    to_i64(u64::from(record.retry_count))?,
                    record.detail,
                ],
            )
            .with_context(|| "failed to insert failure report")?;
            prune(
                conn,
                FAILURE_JOURNAL_CAPACITY,
                Utc::now() - Duration::days(FAILURE_JOURNAL_MAX_AGE_DAYS),
            )?;
            Ok(())
        })
        .await
    }

    /// Delete reports older than `cutoff`, then all but the newest `keep`.
    pub async fn prune_failure_reports(
        &self,
        keep: usize,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        self.execute(move |conn| prune(conn, keep, cutoff)).await
    }

    /// Most recent reports first.
    pub async fn recent_failure_reports(&self, limit: usize) -> Result<Vec<ErrorReport>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT occurred_at, session_id, endpoint, method, classification, retry_count, detail
                 FROM failure_reports
                 ORDER BY occurred_at DESC, id DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                reports.push(ErrorReport {
                    occurred_at: parse_datetime(&row.get::<_, String>(0)?, "occurred_at")?,
                    session_id: row.get(1)?,
                    endpoint: row.get(2)?,
                    method: row.get(3)?,
                    classification: row.get(4)?,
                    retry_count: to_u32(row.get(5)?, "retry_count")?,
                    detail: row.get(6)?,
                });
            }
            Ok(reports)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn report(endpoint: &str, offset_secs: i64) -> ErrorReport {
        ErrorReport {
            occurred_at: Utc::now() + Duration::seconds(offset_secs),
            session_id: Some("session-1".into()),
            endpoint: endpoint.into(),
            method: "POST".into(),
            classification: "processing-timeout".into(),
            retry_count: 3,
            detail: "recognize timed out after 4 attempt(s)".into(),
        }
    }

    #[tokio::test]
    async fn reports_round_trip_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("journal.sqlite3")).unwrap();

        db.insert_failure_report(&report("upload", 0)).await.unwrap();
        db.insert_failure_report(&report("recognize", 5)).await.unwrap();

        let reports = db.recent_failure_reports(10).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].endpoint, "recognize");
        assert_eq!(reports[0].retry_count, 3);
        assert_eq!(reports[1].endpoint, "upload");

        let limited = db.recent_failure_reports(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn expired_reports_are_dropped_on_insert() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("journal.sqlite3")).unwrap();

        let stale = report("upload", -(FAILURE_JOURNAL_MAX_AGE_DAYS + 1) * 86_400);
        db.insert_failure_report(&stale).await.unwrap();
        db.insert_failure_report(&report("recognize", 0)).await.unwrap();

        let reports = db.recent_failure_reports(10).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].endpoint, "recognize");
    }

    #[tokio::test]
    async fn prune_keeps_only_the_newest_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("journal.sqlite3")).unwrap();
        for (offset, endpoint) in ["a", "b", "c", "d"].into_iter().enumerate() {
            db.insert_failure_report(&report(endpoint, offset as i64))
                .await
                .unwrap();
        }

        let removed = db
            .prune_failure_reports(2, Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let endpoints: Vec<String> = db
            .recent_failure_reports(10)
            .await
            .unwrap()
            .into_iter()
            .map(|report| report.endpoint)
            .collect();
        assert_eq!(endpoints, vec!["d", "c"]);
    }
}
