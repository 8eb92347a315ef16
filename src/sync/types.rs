//! Sync data types
//!
//! Defines the save snapshot exchanged with providers and the bookkeeping
//! types produced by one sync operation:
//! - Save snapshots with sync bookkeeping
//! - Stored records and their listing projection
//! - Field-level conflicts and their resolutions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::path;

/// Path of the player's display name inside `gameData`
pub const PLAYER_NAME_PATH: &str = "player.name";
/// Path of the player's level inside `gameData`
pub const PLAYER_LEVEL_PATH: &str = "player.level";
/// Path of the accumulated playtime inside `gameData`
pub const PLAYER_PLAYTIME_PATH: &str = "player.playtime";

/// A full snapshot of one player's game state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    /// Game payload; the engine only reads monitored fields from it
    #[serde(rename = "gameData")]
    pub game_data: Value,
    /// When this snapshot was created or last mutated on the device
    #[serde(rename = "lastSaved")]
    pub last_saved: DateTime<Utc>,
    /// Bookkeeping owned by the sync manager
    #[serde(rename = "syncStatus", default)]
    pub sync_status: SaveSyncStatus,
}

impl SaveData {
    /// Create a new save stamped with the current time
    pub fn new(game_data: Value) -> Self {
        Self {
            game_data,
            last_saved: Utc::now(),
            sync_status: SaveSyncStatus::default(),
        }
    }

    /// Create a save with an explicit `lastSaved` timestamp
    pub fn with_timestamp(game_data: Value, last_saved: DateTime<Utc>) -> Self {
        Self {
            game_data,
            last_saved,
            sync_status: SaveSyncStatus::default(),
        }
    }

    /// Read a value from the game payload by dotted path
    pub fn field(&self, field: &str) -> Option<&Value> {
        path::get(&self.game_data, field)
    }

    /// Serialize the whole save; the inverse of [`SaveData::from_bytes`]
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialize a save produced by [`SaveData::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Sync bookkeeping carried inside every save
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSyncStatus {
    /// Last successful push to the active provider
    #[serde(rename = "lastCloudSync")]
    pub last_cloud_sync: Option<DateTime<Utc>>,
    /// Local mutations not yet pushed
    #[serde(rename = "pendingChanges")]
    pub pending_changes: u32,
}

/// A save as stored by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSaveRecord {
    pub id: String,
    pub payload: SaveData,
    pub timestamp: DateTime<Utc>,
    pub checksum: String,
}

impl CloudSaveRecord {
    /// Build the read-only listing projection of this record
    pub fn info(&self) -> CloudSaveInfo {
        let size = self
            .payload
            .to_bytes()
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0);

        CloudSaveInfo {
            id: self.id.clone(),
            timestamp: self.timestamp,
            size,
            checksum: self.checksum.clone(),
            metadata: CloudSaveMetadata::from_save(&self.payload),
        }
    }
}

/// Listing projection of a stored record, without the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSaveInfo {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Serialized payload length in bytes
    pub size: u64,
    pub checksum: String,
    pub metadata: CloudSaveMetadata,
}

/// Player summary shown next to a stored save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudSaveMetadata {
    #[serde(rename = "playerName")]
    pub player_name: Option<String>,
    pub level: Option<i64>,
    /// Playtime in seconds
    pub playtime: Option<u64>,
}

impl CloudSaveMetadata {
    pub fn from_save(save: &SaveData) -> Self {
        Self {
            player_name: save
                .field(PLAYER_NAME_PATH)
                .and_then(Value::as_str)
                .map(str::to_string),
            level: save.field(PLAYER_LEVEL_PATH).and_then(Value::as_i64),
            playtime: save.field(PLAYER_PLAYTIME_PATH).and_then(Value::as_u64),
        }
    }
}

/// Receipt returned by a provider after storing a save
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(rename = "cloudId")]
    pub cloud_id: String,
    pub timestamp: DateTime<Utc>,
}

/// The latest stored save, as returned by a provider
#[derive(Debug, Clone)]
pub struct DownloadedSave {
    pub id: String,
    pub data: SaveData,
    pub timestamp: DateTime<Utc>,
}

impl From<CloudSaveRecord> for DownloadedSave {
    fn from(record: CloudSaveRecord) -> Self {
        Self {
            id: record.id,
            data: record.payload,
            timestamp: record.timestamp,
        }
    }
}

/// How a single conflict is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the local value
    UseLocal,
    /// Take the cloud value
    UseCloud,
    /// Keep the larger of two numeric values
    Merge,
}

/// `lastSaved` of both sides of a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictTimestamps {
    pub local: DateTime<Utc>,
    pub cloud: DateTime<Utc>,
}

/// A monitored field whose local and cloud values disagree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConflict {
    /// Dotted path into `gameData`
    pub field: String,
    #[serde(rename = "localValue")]
    pub local_value: Value,
    #[serde(rename = "cloudValue")]
    pub cloud_value: Value,
    pub timestamp: ConflictTimestamps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl DataConflict {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

/// Terminal output of every sync manager operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub conflicts: Vec<DataConflict>,
    #[serde(rename = "resolvedChanges")]
    pub resolved_changes: usize,
    /// Always present on the wire, `null` on success
    pub error: Option<String>,
    /// Save that was uploaded (push) or fetched (pull)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save: Option<SaveData>,
}

impl SyncResult {
    pub fn succeeded(save: SaveData, conflicts: Vec<DataConflict>, resolved_changes: usize) -> Self {
        Self {
            success: true,
            conflicts,
            resolved_changes,
            error: None,
            save: Some(save),
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            conflicts: Vec::new(),
            resolved_changes: 0,
            error: Some(error.to_string()),
            save: None,
        }
    }

    /// Failed result that still reports the conflicts it stopped on
    pub fn blocked(error: impl ToString, conflicts: Vec<DataConflict>) -> Self {
        Self {
            conflicts,
            ..Self::failed(error)
        }
    }
}

/// Read-only view of the sync manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncManagerStatus {
    pub enabled: bool,
    #[serde(rename = "activeProvider")]
    pub active_provider: Option<String>,
    #[serde(rename = "inProgress")]
    pub in_progress: bool,
    /// Names of all registered providers
    #[serde(rename = "availableProviders")]
    pub available_providers: Vec<String>,
}
