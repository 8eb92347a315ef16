//! Sync providers
//!
//! A provider is an interchangeable backing store for saves. The sync
//! manager only talks to providers through [`SyncProvider`].
//!
//! Implementations:
//! - [`LocalStoreProvider`]: device-local directory of JSON records
//! - [`SqliteProvider`]: SQLite table via sqlx
//! - [`S3Provider`]: S3-compatible object store
//!
//! Every provider:
//! - assigns each upload a fresh id and a timestamp strictly later than any
//!   stored record, so ordering by timestamp is total
//! - keeps at most `max_saves` records, evicting the oldest first
//! - skips stored records that fail to decode instead of failing the call

mod local;
mod s3;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::ProviderError;
use crate::sync::{CloudSaveInfo, CloudSaveRecord, DownloadedSave, SaveData, UploadReceipt};

pub use local::LocalStoreProvider;
pub use s3::S3Provider;
pub use sqlite::SqliteProvider;

/// Records kept per provider unless configured otherwise
pub const DEFAULT_MAX_SAVES: usize = 10;

/// Backing store contract used by the sync manager
#[async_trait]
pub trait SyncProvider: Send + Sync {
    /// Short identifier used in logs and status output
    fn name(&self) -> &str;

    /// Probe whether the store can be used right now. Never fails.
    async fn is_available(&self) -> bool;

    /// Store a save as a new record and enforce retention
    async fn upload(&self, save: &SaveData) -> Result<UploadReceipt, ProviderError>;

    /// Fetch the most recent record, `None` when nothing is stored
    async fn download(&self) -> Result<Option<DownloadedSave>, ProviderError>;

    /// Remove one record; `false` when no record has that id
    async fn delete(&self, id: &str) -> Result<bool, ProviderError>;

    /// Project every stored record, newest first
    async fn list_saves(&self) -> Result<Vec<CloudSaveInfo>, ProviderError>;
}

/// Timestamp for a new record: now, or just after the newest stored record
pub(crate) fn next_timestamp(newest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match newest {
        Some(newest) if newest >= now => newest + Duration::microseconds(1),
        _ => now,
    }
}

/// Sort records newest first
pub(crate) fn sort_newest_first(records: &mut [CloudSaveRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

/// Split off the records that exceed the retention bound.
///
/// `records` must already be sorted newest first.
pub(crate) fn evict_beyond(records: &mut Vec<CloudSaveRecord>, max_saves: usize) -> Vec<CloudSaveRecord> {
    if records.len() <= max_saves {
        return Vec::new();
    }
    records.split_off(max_saves)
}

/// Ids are generated by providers; reject anything that could escape a key
/// namespace or a directory.
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
