use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

use crate::application::ports::SnapshotStore;
use crate::shared::error::AppError;

/// SQLite にスナップショットを永続化する。再起動をまたぐオフライン起動用
pub struct SqliteSnapshotStore {
    pool: Pool<Sqlite>,
}

impl SqliteSnapshotStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_snapshots (
                snapshot_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT payload FROM sync_snapshots WHERE snapshot_key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<String, _>("payload")))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sync_snapshots (snapshot_key, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(snapshot_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sync_snapshots WHERE snapshot_key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
