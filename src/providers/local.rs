//! Device-local save store
//!
//! Keeps each record as one JSON file in a directory, keyed by
//! `<key_prefix><id>.json`. This is the reference provider.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::{evict_beyond, is_valid_id, next_timestamp, sort_newest_first, SyncProvider};
use crate::error::ProviderError;
use crate::sync::{
    save_checksum, CloudSaveInfo, CloudSaveRecord, DownloadedSave, SaveData, UploadReceipt,
};

const DEFAULT_KEY_PREFIX: &str = "cloudsave_";
const RECORD_EXTENSION: &str = "json";

/// Directory-backed provider
pub struct LocalStoreProvider {
    name: String,
    base_path: PathBuf,
    key_prefix: String,
    max_saves: usize,
}

impl LocalStoreProvider {
    pub fn new(base_path: impl Into<PathBuf>, max_saves: usize) -> Self {
        Self {
            name: "local".to_string(),
            base_path: base_path.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_saves,
        }
    }

    /// Override the provider name reported to the manager
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.base_path
            .join(format!("{}{}.{}", self.key_prefix, id, RECORD_EXTENSION))
    }

    fn is_record_file(&self, path: &Path) -> bool {
        let matches_ext = path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION);
        let matches_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&self.key_prefix));
        matches_ext && matches_prefix
    }

    /// Load every decodable record, newest first
    async fn read_records(&self) -> Result<Vec<CloudSaveRecord>, ProviderError> {
        let mut entries = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.is_record_file(&path) {
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable save record");
                    continue;
                }
            };

            match serde_json::from_slice::<CloudSaveRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed save record");
                }
            }
        }

        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Write via a temporary file so readers never see a partial record
    async fn write_record(&self, record: &CloudSaveRecord) -> Result<(), ProviderError> {
        let bytes = serde_json::to_vec(record)?;
        let path = self.record_path(&record.id);
        let temp_path = path.with_extension("tmp");

        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncProvider for LocalStoreProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        // The directory may not exist yet; probe the nearest existing ancestor
        for dir in self.base_path.ancestors() {
            if dir.as_os_str().is_empty() {
                break;
            }
            match tokio::fs::metadata(dir).await {
                Ok(meta) => return meta.is_dir() && !meta.permissions().readonly(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(_) => return false,
            }
        }
        // Relative path whose ancestors are all missing: resolves against cwd
        std::env::current_dir().is_ok()
    }

    async fn upload(&self, save: &SaveData) -> Result<UploadReceipt, ProviderError> {
        tokio::fs::create_dir_all(&self.base_path).await?;

        let mut records = self.read_records().await?;
        let record = CloudSaveRecord {
            id: Uuid::new_v4().to_string(),
            checksum: save_checksum(save)?,
            payload: save.clone(),
            timestamp: next_timestamp(records.first().map(|r| r.timestamp)),
        };

        self.write_record(&record).await?;

        let receipt = UploadReceipt {
            cloud_id: record.id.clone(),
            timestamp: record.timestamp,
        };

        records.insert(0, record);
        for stale in evict_beyond(&mut records, self.max_saves) {
            if let Err(e) = tokio::fs::remove_file(self.record_path(&stale.id)).await {
                tracing::warn!(id = %stale.id, error = %e, "Failed to evict old save record");
            } else {
                tracing::debug!(id = %stale.id, "Evicted old save record");
            }
        }

        tracing::info!(
            provider = %self.name,
            id = %receipt.cloud_id,
            "Stored save record"
        );
        Ok(receipt)
    }

    async fn download(&self) -> Result<Option<DownloadedSave>, ProviderError> {
        let records = self.read_records().await?;
        Ok(records.into_iter().next().map(DownloadedSave::from))
    }

    async fn delete(&self, id: &str) -> Result<bool, ProviderError> {
        if !is_valid_id(id) {
            return Ok(false);
        }

        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_saves(&self) -> Result<Vec<CloudSaveInfo>, ProviderError> {
        let records = self.read_records().await?;
        Ok(records.iter().map(CloudSaveRecord::info).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn make_save(money: i64) -> SaveData {
        SaveData::new(json!({"player": {"name": "Ada", "money": money, "level": 3}}))
    }

    #[tokio::test]
    async fn test_upload_and_download_latest() {
        let temp_dir = TempDir::new().unwrap();
        let provider = LocalStoreProvider::new(temp_dir.path(), 10);

        assert!(provider.download().await.unwrap().is_none());

        provider.upload(&make_save(100)).await.unwrap();
        let receipt = provider.upload(&make_save(200)).await.unwrap();

        let latest = provider.download().await.unwrap().unwrap();
        assert_eq!(latest.id, receipt.cloud_id);
        assert_eq!(latest.timestamp, receipt.timestamp);
        assert_eq!(latest.data.field("player.money"), Some(&json!(200)));
    }

    #[tokio::test]
    async fn test_payload_round_trip_is_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let provider = LocalStoreProvider::new(temp_dir.path(), 10);
        let save = make_save(5000);

        provider.upload(&save).await.unwrap();
        let stored = provider.download().await.unwrap().unwrap();

        assert_eq!(stored.data.to_bytes().unwrap(), save.to_bytes().unwrap());
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest() {
        let temp_dir = TempDir::new().unwrap();
        let provider = LocalStoreProvider::new(temp_dir.path(), 3);

        let first = provider.upload(&make_save(0)).await.unwrap();
        for money in 1..4 {
            provider.upload(&make_save(money)).await.unwrap();
        }

        let saves = provider.list_saves().await.unwrap();
        assert_eq!(saves.len(), 3);
        assert!(saves.iter().all(|s| s.id != first.cloud_id));
        assert!(saves.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let provider = LocalStoreProvider::new(temp_dir.path(), 10);
        let receipt = provider.upload(&make_save(1)).await.unwrap();

        assert!(provider.delete(&receipt.cloud_id).await.unwrap());
        assert!(!provider.delete(&receipt.cloud_id).await.unwrap());
        assert!(!provider.delete("../escape").await.unwrap());
        assert!(provider.list_saves().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let provider = LocalStoreProvider::new(temp_dir.path(), 10);
        provider.upload(&make_save(7)).await.unwrap();

        tokio::fs::write(temp_dir.path().join("cloudsave_broken.json"), b"{not json")
            .await
            .unwrap();
        tokio::fs::write(temp_dir.path().join("unrelated.txt"), b"ignored")
            .await
            .unwrap();

        let saves = provider.list_saves().await.unwrap();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].metadata.player_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_availability() {
        let temp_dir = TempDir::new().unwrap();
        let missing = LocalStoreProvider::new(temp_dir.path().join("not/yet/created"), 10);
        assert!(missing.is_available().await);

        let file_path = temp_dir.path().join("a-file");
        std::fs::write(&file_path, b"x").unwrap();
        let blocked = LocalStoreProvider::new(file_path.join("saves"), 10);
        assert!(!blocked.is_available().await);
    }
}
