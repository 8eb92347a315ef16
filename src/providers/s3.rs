//! S3-compatible remote save store
//!
//! Each record is one JSON object at `<prefix>/<id>.json`.

use async_trait::async_trait;
use futures::future::join_all;
use uuid::Uuid;

use super::{evict_beyond, is_valid_id, next_timestamp, sort_newest_first, SyncProvider};
use crate::error::ProviderError;
use crate::storage::S3Client;
use crate::sync::{
    save_checksum, CloudSaveInfo, CloudSaveRecord, DownloadedSave, SaveData, UploadReceipt,
};

/// Provider backed by an S3-compatible bucket
pub struct S3Provider {
    client: S3Client,
    prefix: String,
    max_saves: usize,
}

impl S3Provider {
    pub fn new(client: S3Client, prefix: impl Into<String>, max_saves: usize) -> Self {
        Self {
            client,
            prefix: prefix.into().trim_matches('/').to_string(),
            max_saves,
        }
    }

    fn record_key(&self, id: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}.json", id)
        } else {
            format!("{}/{}.json", self.prefix, id)
        }
    }

    fn list_prefix(&self) -> Option<String> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(format!("{}/", self.prefix))
        }
    }

    /// Fetch and decode every record under the prefix, newest first
    async fn read_records(&self) -> Result<Vec<CloudSaveRecord>, ProviderError> {
        let objects = self
            .client
            .list_all_objects(self.list_prefix().as_deref())
            .await?;

        let fetches = objects
            .iter()
            .filter(|obj| obj.key.ends_with(".json"))
            .map(|obj| async move { (obj.key.as_str(), self.client.get_object(&obj.key).await) });

        let mut records = Vec::new();
        for (key, result) in join_all(fetches).await {
            let bytes = match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable save record");
                    continue;
                }
            };
            match serde_json::from_slice::<CloudSaveRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping malformed save record");
                }
            }
        }

        sort_newest_first(&mut records);
        Ok(records)
    }
}

#[async_trait]
impl SyncProvider for S3Provider {
    fn name(&self) -> &str {
        "s3"
    }

    async fn is_available(&self) -> bool {
        self.client.bucket_exists().await
    }

    async fn upload(&self, save: &SaveData) -> Result<UploadReceipt, ProviderError> {
        let mut records = self.read_records().await?;

        let record = CloudSaveRecord {
            id: Uuid::new_v4().to_string(),
            checksum: save_checksum(save)?,
            payload: save.clone(),
            timestamp: next_timestamp(records.first().map(|r| r.timestamp)),
        };

        let body = serde_json::to_vec(&record)?;
        self.client
            .put_object(&self.record_key(&record.id), body, "application/json")
            .await?;

        let receipt = UploadReceipt {
            cloud_id: record.id.clone(),
            timestamp: record.timestamp,
        };

        records.insert(0, record);
        for stale in evict_beyond(&mut records, self.max_saves) {
            if let Err(e) = self.client.delete_object(&self.record_key(&stale.id)).await {
                tracing::warn!(id = %stale.id, error = %e, "Failed to evict old save record");
            }
        }

        tracing::info!(
            provider = "s3",
            bucket = %self.client.bucket(),
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

        let key = self.record_key(id);
        if !self.client.object_exists(&key).await? {
            return Ok(false);
        }

        self.client.delete_object(&key).await?;
        Ok(true)
    }

    async fn list_saves(&self) -> Result<Vec<CloudSaveInfo>, ProviderError> {
        let records = self.read_records().await?;
        Ok(records.iter().map(CloudSaveRecord::info).collect())
    }
}
