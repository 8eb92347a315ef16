//! Conflict detection and resolution
//!
//! Detection compares a fixed set of monitored fields between a local and a
//! cloud save. Resolution is a pluggable strategy deciding, per conflict,
//! which side wins.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::types::{ConflictTimestamps, DataConflict, Resolution, SaveData};

/// Fields compared when no explicit set is configured
pub const DEFAULT_MONITORED_FIELDS: &[&str] = &[
    "player.money",
    "player.level",
    "player.expeditionsCompleted",
];

/// Compares monitored fields between two saves
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    monitored_fields: Vec<String>,
}

impl ConflictDetector {
    /// Create a detector for the given dotted paths
    pub fn new<I, S>(monitored_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            monitored_fields: monitored_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn monitored_fields(&self) -> &[String] {
        &self.monitored_fields
    }

    /// Emit one conflict per monitored field whose values differ.
    ///
    /// Fields outside the monitored set are never compared. A field missing
    /// on one side compares as `null`.
    pub fn detect(&self, local: &SaveData, cloud: &SaveData) -> Vec<DataConflict> {
        let timestamp = ConflictTimestamps {
            local: local.last_saved,
            cloud: cloud.last_saved,
        };

        self.monitored_fields
            .iter()
            .filter_map(|field| {
                let local_value = local.field(field).cloned().unwrap_or(Value::Null);
                let cloud_value = cloud.field(field).cloned().unwrap_or(Value::Null);

                if values_equal(&local_value, &cloud_value) {
                    return None;
                }

                Some(DataConflict {
                    field: field.clone(),
                    local_value,
                    cloud_value,
                    timestamp,
                    resolution: None,
                })
            })
            .collect()
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MONITORED_FIELDS.iter().copied())
    }
}

/// Numbers compare by value so `5000` and `5000.0` are the same field state
fn values_equal(a: &Value, b: &Value) -> bool {
    match numeric_cmp(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Order two JSON numbers; `None` unless both values are numbers.
///
/// Integers compare exactly. Floats are only involved when one side is a float.
pub(crate) fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    let (Value::Number(a), Value::Number(b)) = (a, b) else {
        return None;
    };

    match (as_integer(a), as_integer(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Decides a resolution for each detected conflict
pub trait ConflictResolver: Send + Sync {
    /// Return the conflicts with `resolution` filled in where this strategy
    /// can decide. Conflicts left unresolved must be settled by the caller.
    fn resolve(&self, conflicts: Vec<DataConflict>) -> Vec<DataConflict>;
}

/// Every conflict keeps the local value
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferLocal;

impl ConflictResolver for PreferLocal {
    fn resolve(&self, conflicts: Vec<DataConflict>) -> Vec<DataConflict> {
        conflicts
            .into_iter()
            .map(|c| c.with_resolution(Resolution::UseLocal))
            .collect()
    }
}

/// Every conflict takes the cloud value
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferRemote;

impl ConflictResolver for PreferRemote {
    fn resolve(&self, conflicts: Vec<DataConflict>) -> Vec<DataConflict> {
        conflicts
            .into_iter()
            .map(|c| c.with_resolution(Resolution::UseCloud))
            .collect()
    }
}

/// The side saved most recently wins; ties go to local
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferNewest;

impl ConflictResolver for PreferNewest {
    fn resolve(&self, conflicts: Vec<DataConflict>) -> Vec<DataConflict> {
        conflicts
            .into_iter()
            .map(|c| {
                let resolution = if c.timestamp.local >= c.timestamp.cloud {
                    Resolution::UseLocal
                } else {
                    Resolution::UseCloud
                };
                tracing::debug!(field = %c.field, ?resolution, "Resolved by newest save");
                c.with_resolution(resolution)
            })
            .collect()
    }
}

/// Leaves every conflict for the caller to decide
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualResolver;

impl ConflictResolver for ManualResolver {
    fn resolve(&self, conflicts: Vec<DataConflict>) -> Vec<DataConflict> {
        conflicts
            .into_iter()
            .map(|mut c| {
                c.resolution = None;
                c
            })
            .collect()
    }
}

/// Configured conflict resolution policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    Manual,
    LocalWins,
    CloudWins,
    #[default]
    NewestWins,
}

impl ConflictStrategy {
    /// Build the resolver implementing this policy
    pub fn resolver(self) -> Box<dyn ConflictResolver> {
        match self {
            ConflictStrategy::Manual => Box::new(ManualResolver),
            ConflictStrategy::LocalWins => Box::new(PreferLocal),
            ConflictStrategy::CloudWins => Box::new(PreferRemote),
            ConflictStrategy::NewestWins => Box::new(PreferNewest),
        }
    }

    /// Parse the configuration spelling, e.g. `newest_wins`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(ConflictStrategy::Manual),
            "local_wins" => Some(ConflictStrategy::LocalWins),
            "cloud_wins" => Some(ConflictStrategy::CloudWins),
            "newest_wins" => Some(ConflictStrategy::NewestWins),
            _ => None,
        }
    }
}

/// Copy caller-supplied resolutions onto freshly detected conflicts.
///
/// Decisions are matched by field. A decision without a resolution, or a
/// conflict without a matching decision, stays unresolved.
pub fn apply_decisions(conflicts: Vec<DataConflict>, decisions: &[DataConflict]) -> Vec<DataConflict> {
    conflicts
        .into_iter()
        .map(|mut conflict| {
            conflict.resolution = decisions
                .iter()
                .find(|d| d.field == conflict.field)
                .and_then(|d| d.resolution);
            conflict
        })
        .collect()
}
