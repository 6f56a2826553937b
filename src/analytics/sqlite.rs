use super::{AnalyticsPersistence, AnalyticsSnapshot};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

/// Stores the counters as one JSON document in a single-row table.
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
    table_name: String,
}

impl SqliteStore {
    /// Connects lazily, so an unreachable database surfaces on the first
    /// load or save rather than here.
    pub fn new(path: PathBuf, table_name: String) -> Result<Self> {
        if table_name.is_empty()
            || !table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Config(format!(
                "invalid analytics table name: {:?}",
                table_name
            )));
        }

        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect_lazy(&conn_str)?;

        Ok(Self {
            pool,
            path,
            table_name,
        })
    }

    async fn ensure_table(&self) -> Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id INTEGER PRIMARY KEY CHECK (id = 1), \
             document TEXT NOT NULL, \
             updated_at TEXT NOT NULL)",
            self.table_name
        );
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsPersistence for SqliteStore {
    async fn load(&self) -> Result<Option<AnalyticsSnapshot>> {
        self.ensure_table().await?;

        let query = format!("SELECT document FROM {} WHERE id = 1", self.table_name);
        let document: Option<String> = sqlx::query_scalar(&query)
            .fetch_optional(&self.pool)
            .await?;

        match document {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, snapshot: &AnalyticsSnapshot) -> Result<()> {
        self.ensure_table().await?;

        let query = format!(
            "INSERT INTO {} (id, document, updated_at) VALUES (1, ?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
            self.table_name
        );
        sqlx::query(&query)
            .bind(serde_json::to_string(snapshot)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}#{}", self.path.display(), self.table_name)
    }
}
