use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::models::SummaryRecord;
use crate::domain::ports::SummaryStore;

/// Append-only SQLite store for completed summaries.
///
/// Writes are best-effort from the aggregator's point of view; a retried
/// summarization cycle may append a near-duplicate record, which is accepted
/// for an analytics-oriented table.
pub struct SqliteSummaryStore {
    pool: SqlitePool,
}

impl SqliteSummaryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All records for a session, oldest first.
    pub async fn list_for_session(&self, session_id: &str) -> Result<Vec<SummaryRecord>> {
        let rows: Vec<(String, String, i64, i64, i64, Option<String>, Option<String>, String)> =
            sqlx::query_as(
                "SELECT session_id, summary_text, covers_start, covers_end, message_count,
                        time_range_start, time_range_end, domains
                 FROM context_summaries WHERE session_id = ? ORDER BY id",
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to list summaries")?;

        rows.into_iter()
            .map(|row| {
                Ok(SummaryRecord {
                    session_id: row.0,
                    text: row.1,
                    covers_start: u64::try_from(row.2).unwrap_or(0),
                    covers_end: u64::try_from(row.3).unwrap_or(0),
                    message_count: usize::try_from(row.4).unwrap_or(0),
                    time_range_start: parse_timestamp(row.5.as_deref()),
                    time_range_end: parse_timestamp(row.6.as_deref()),
                    domains: serde_json::from_str(&row.7).unwrap_or_default(),
                })
            })
            .collect()
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.and_then(|value| {
        chrono::DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|parsed| parsed.with_timezone(&chrono::Utc))
    })
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    async fn append(&self, record: &SummaryRecord) -> Result<()> {
        let domains = serde_json::to_string(&record.domains)?;
        sqlx::query(
            "INSERT INTO context_summaries
                 (session_id, summary_text, covers_start, covers_end, message_count,
                  time_range_start, time_range_end, domains)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.session_id)
        .bind(&record.text)
        .bind(i64::try_from(record.covers_start).unwrap_or(i64::MAX))
        .bind(i64::try_from(record.covers_end).unwrap_or(i64::MAX))
        .bind(i64::try_from(record.message_count).unwrap_or(i64::MAX))
        .bind(record.time_range_start.map(|t| t.to_rfc3339()))
        .bind(record.time_range_end.map(|t| t.to_rfc3339()))
        .bind(domains)
        .execute(&self.pool)
        .await
        .context("failed to append summary record")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DatabaseConfig;
    use crate::infrastructure::database::DatabaseConnection;
    use chrono::Utc;

    async fn store() -> (SqliteSummaryStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("test.db").display().to_string(),
            max_connections: 2,
        };
        let connection = DatabaseConnection::new(&config).await.unwrap();
        (SqliteSummaryStore::new(connection.pool().clone()), dir)
    }

    fn record(session_id: &str, covers: (u64, u64)) -> SummaryRecord {
        SummaryRecord {
            session_id: session_id.to_string(),
            text: "the team discussed replication forks".to_string(),
            covers_start: covers.0,
            covers_end: covers.1,
            message_count: 4,
            time_range_start: Some(Utc::now()),
            time_range_end: Some(Utc::now()),
            domains: vec!["Biology".to_string()],
        }
    }

    #[tokio::test]
    async fn test_append_and_list_round_trip() {
        let (store, _dir) = store().await;

        store.append(&record("s1", (1, 4))).await.unwrap();
        store.append(&record("s1", (5, 9))).await.unwrap();
        store.append(&record("other", (1, 2))).await.unwrap();

        let records = store.list_for_session("s1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].covers_end, 4);
        assert_eq!(records[1].covers_start, 5);
        assert_eq!(records[1].domains, vec!["Biology"]);
    }

    #[tokio::test]
    async fn test_duplicate_appends_are_accepted() {
        let (store, _dir) = store().await;
        let summary = record("s1", (1, 4));

        store.append(&summary).await.unwrap();
        store.append(&summary).await.unwrap();

        assert_eq!(store.list_for_session("s1").await.unwrap().len(), 2);
    }
}
