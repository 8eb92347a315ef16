//! SQLite-backed save store

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{next_timestamp, SyncProvider};
use crate::error::ProviderError;
use crate::sync::{
    save_checksum, CloudSaveInfo, CloudSaveRecord, DownloadedSave, SaveData, UploadReceipt,
};

/// Provider storing records in a `cloud_saves` table
pub struct SqliteProvider {
    pool: SqlitePool,
    max_saves: usize,
}

impl SqliteProvider {
    pub fn new(pool: SqlitePool, max_saves: usize) -> Self {
        Self { pool, max_saves }
    }

    /// Initialize the saves table
    pub async fn init(&self) -> Result<(), ProviderError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cloud_saves (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                checksum TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cloud_saves_timestamp ON cloud_saves(timestamp);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All decodable records, newest first
    async fn fetch_records(&self) -> Result<Vec<CloudSaveRecord>, ProviderError> {
        let rows = sqlx::query_as::<_, SaveRow>(
            r#"
            SELECT id, payload, timestamp, checksum
            FROM cloud_saves
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(SaveRow::into_record).collect())
    }
}

/// Fixed-width UTC timestamps keep lexical and chronological order aligned
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[async_trait]
impl SyncProvider for SqliteProvider {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn is_available(&self) -> bool {
        if self.pool.is_closed() {
            return false;
        }
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn upload(&self, save: &SaveData) -> Result<UploadReceipt, ProviderError> {
        let payload = serde_json::to_string(save)?;
        let checksum = save_checksum(save)?;
        let id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;

        let newest: Option<(String,)> =
            sqlx::query_as("SELECT timestamp FROM cloud_saves ORDER BY timestamp DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;
        let newest = newest
            .and_then(|(s,)| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let timestamp = next_timestamp(newest);

        sqlx::query(
            r#"
            INSERT INTO cloud_saves (id, payload, timestamp, checksum)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&payload)
        .bind(format_timestamp(&timestamp))
        .bind(&checksum)
        .execute(&mut *tx)
        .await?;

        let evicted = sqlx::query(
            r#"
            DELETE FROM cloud_saves
            WHERE id NOT IN (
                SELECT id FROM cloud_saves
                ORDER BY timestamp DESC, id DESC
                LIMIT ?
            )
            "#,
        )
        .bind(self.max_saves as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if evicted.rows_affected() > 0 {
            tracing::debug!(count = evicted.rows_affected(), "Evicted old save records");
        }
        tracing::info!(provider = "sqlite", id = %id, "Stored save record");

        Ok(UploadReceipt {
            cloud_id: id,
            timestamp,
        })
    }

    async fn download(&self) -> Result<Option<DownloadedSave>, ProviderError> {
        // Walk newest first so one corrupt row does not hide older valid ones
        let records = self.fetch_records().await?;
        Ok(records.into_iter().next().map(DownloadedSave::from))
    }

    async fn delete(&self, id: &str) -> Result<bool, ProviderError> {
        let result = sqlx::query("DELETE FROM cloud_saves WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_saves(&self) -> Result<Vec<CloudSaveInfo>, ProviderError> {
        let records = self.fetch_records().await?;
        Ok(records.iter().map(CloudSaveRecord::info).collect())
    }
}

#[derive(sqlx::FromRow)]
struct SaveRow {
    id: String,
    payload: String,
    timestamp: String,
    checksum: String,
}

impl SaveRow {
    fn into_record(self) -> Option<CloudSaveRecord> {
        let payload = match serde_json::from_str::<SaveData>(&self.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "Skipping malformed save record");
                return None;
            }
        };

        let timestamp = match DateTime::parse_from_rfc3339(&self.timestamp) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "Skipping save record with bad timestamp");
                return None;
            }
        };

        Some(CloudSaveRecord {
            id: self.id,
            payload,
            timestamp,
            checksum: self.checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_provider(max_saves: usize) -> SqliteProvider {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let provider = SqliteProvider::new(pool, max_saves);
        provider.init().await.unwrap();
        provider
    }

    fn make_save(money: i64) -> SaveData {
        SaveData::new(json!({"player": {"name": "Ada", "money": money, "level": 2}}))
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let provider = setup_provider(10).await;
        assert!(provider.is_available().await);
        assert!(provider.download().await.unwrap().is_none());

        let save = make_save(300);
        let receipt = provider.upload(&save).await.unwrap();

        let latest = provider.download().await.unwrap().unwrap();
        assert_eq!(latest.id, receipt.cloud_id);
        assert_eq!(latest.data, save);
    }

    #[tokio::test]
    async fn test_retention_bound() {
        let provider = setup_provider(10).await;

        let first = provider.upload(&make_save(0)).await.unwrap();
        for money in 1..=10 {
            provider.upload(&make_save(money)).await.unwrap();
        }

        let saves = provider.list_saves().await.unwrap();
        assert_eq!(saves.len(), 10);
        assert!(saves.iter().all(|s| s.id != first.cloud_id));
        assert!(saves.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    }

    #[tokio::test]
    async fn test_malformed_row_is_skipped() {
        let provider = setup_provider(10).await;
        let receipt = provider.upload(&make_save(1)).await.unwrap();

        sqlx::query("INSERT INTO cloud_saves (id, payload, timestamp, checksum) VALUES (?, ?, ?, ?)")
            .bind("corrupt")
            .bind("{truncated")
            .bind("9999-12-31T23:59:59.000000000Z")
            .bind("00000000")
            .execute(&provider.pool)
            .await
            .unwrap();

        let latest = provider.download().await.unwrap().unwrap();
        assert_eq!(latest.id, receipt.cloud_id);
        assert_eq!(provider.list_saves().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let provider = setup_provider(10).await;
        let receipt = provider.upload(&make_save(1)).await.unwrap();

        assert!(provider.delete(&receipt.cloud_id).await.unwrap());
        assert!(!provider.delete(&receipt.cloud_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let provider = setup_provider(10).await;
        provider.pool.close().await;

        assert!(!provider.is_available().await);
        assert!(provider.upload(&make_save(1)).await.is_err());
    }
}
