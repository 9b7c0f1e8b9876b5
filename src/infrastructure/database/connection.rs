use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;

use crate::domain::models::DatabaseConfig;

/// SQLite connection pool with WAL mode for concurrent access.
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    /// Open (creating if missing) the summary database and apply the schema.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("failed to create connection pool")?;

        let connection = Self { pool };
        connection.migrate().await?;
        Ok(connection)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS context_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                summary_text TEXT NOT NULL,
                covers_start INTEGER NOT NULL,
                covers_end INTEGER NOT NULL,
                message_count INTEGER NOT NULL,
                time_range_start TEXT,
                time_range_end TEXT,
                domains TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("failed to create context_summaries table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_context_summaries_session
             ON context_summaries(session_id)",
        )
        .execute(&self.pool)
        .await
        .context("failed to create session index")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_creates_database_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested/colloquy.db").display().to_string(),
            max_connections: 2,
        };

        let connection = DatabaseConnection::new(&config).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM context_summaries")
            .fetch_one(connection.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}
