//! Merge engine
//!
//! Folds resolved conflicts onto an independent copy of the local save.

use std::cmp::Ordering;

use chrono::Utc;
use serde_json::Value;

use super::conflict::numeric_cmp;
use super::path;
use super::types::{DataConflict, Resolution, SaveData};

/// Outcome of folding conflicts into a save
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub save: SaveData,
    /// Conflicts that carried a resolution and were applied
    pub applied: usize,
}

/// Produce the next canonical save from `local` and the resolved conflicts.
///
/// Neither input is mutated. `use_local` is a no-op, `use_cloud` writes the
/// cloud value, and `merge` keeps the larger of two numeric values. A
/// `merge` on non-numeric values falls back to the local value. Unresolved
/// conflicts are skipped. The result is stamped as freshly synced.
pub fn merge(local: &SaveData, conflicts: &[DataConflict]) -> MergeOutcome {
    let mut save = local.clone();
    let mut applied = 0;

    for conflict in conflicts {
        let Some(resolution) = conflict.resolution else {
            continue;
        };

        let value = match resolution {
            Resolution::UseLocal => None,
            Resolution::UseCloud => Some(conflict.cloud_value.clone()),
            Resolution::Merge => {
                let merged = max_numeric(&conflict.local_value, &conflict.cloud_value);
                if merged.is_none() {
                    tracing::warn!(
                        field = %conflict.field,
                        "Merge requested on non-numeric values, keeping local value"
                    );
                }
                merged
            }
        };

        if let Some(value) = value {
            if !path::set(&mut save.game_data, &conflict.field, value) {
                tracing::warn!(field = %conflict.field, "Cannot write resolved value, path is blocked");
                continue;
            }
        }
        applied += 1;
    }

    let now = Utc::now();
    save.last_saved = now;
    save.sync_status.last_cloud_sync = Some(now);
    save.sync_status.pending_changes = 0;

    MergeOutcome { save, applied }
}

/// The larger of two numbers, keeping its original representation
fn max_numeric(local: &Value, cloud: &Value) -> Option<Value> {
    match numeric_cmp(local, cloud)? {
        Ordering::Less => Some(cloud.clone()),
        Ordering::Equal | Ordering::Greater => Some(local.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::conflict::{ConflictDetector, ConflictResolver, PreferNewest};
    use crate::sync::types::ConflictTimestamps;
    use chrono::Duration;
    use serde_json::json;

    fn conflict(field: &str, local: Value, cloud: Value, resolution: Resolution) -> DataConflict {
        let now = Utc::now();
        DataConflict {
            field: field.to_string(),
            local_value: local,
            cloud_value: cloud,
            timestamp: ConflictTimestamps { local: now, cloud: now },
            resolution: Some(resolution),
        }
    }

    fn local_save() -> SaveData {
        let mut save = SaveData::new(json!({
            "player": {"money": 5000, "level": 3, "title": "Scout"}
        }));
        save.sync_status.pending_changes = 4;
        save
    }

    #[test]
    fn test_newest_wins_scenario() {
        let local = SaveData::with_timestamp(
            json!({"player": {"money": 5000, "level": 3}}),
            Utc::now(),
        );
        let cloud = SaveData::with_timestamp(
            json!({"player": {"money": 4000, "level": 3}}),
            Utc::now() - Duration::minutes(5),
        );

        let conflicts = PreferNewest.resolve(ConflictDetector::default().detect(&local, &cloud));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resolution, Some(Resolution::UseLocal));

        let outcome = merge(&local, &conflicts);
        assert_eq!(outcome.save.field("player.money"), Some(&json!(5000)));
    }

    #[test]
    fn test_use_cloud_overwrites() {
        let local = local_save();
        let outcome = merge(
            &local,
            &[conflict("player.money", json!(5000), json!(4000), Resolution::UseCloud)],
        );

        assert_eq!(outcome.save.field("player.money"), Some(&json!(4000)));
        assert_eq!(outcome.applied, 1);
    }

    #[test]
    fn test_merge_takes_numeric_max() {
        let local = local_save();
        let outcome = merge(
            &local,
            &[
                conflict("player.money", json!(5000), json!(7000), Resolution::Merge),
                conflict("player.level", json!(3), json!(2), Resolution::Merge),
            ],
        );

        assert_eq!(outcome.save.field("player.money"), Some(&json!(7000)));
        assert_eq!(outcome.save.field("player.level"), Some(&json!(3)));
    }

    #[test]
    fn test_merge_keeps_larger_of_close_large_integers() {
        let local = local_save();
        let outcome = merge(
            &local,
            &[conflict(
                "player.money",
                json!(9_007_199_254_740_992_u64),
                json!(9_007_199_254_740_993_u64),
                Resolution::Merge,
            )],
        );

        assert_eq!(outcome.save.field("player.money"), Some(&json!(9_007_199_254_740_993_u64)));
    }

    #[test]
    fn test_merge_non_numeric_keeps_local() {
        let local = local_save();
        let outcome = merge(
            &local,
            &[conflict("player.title", json!("Scout"), json!("Warden"), Resolution::Merge)],
        );

        assert_eq!(outcome.save.field("player.title"), Some(&json!("Scout")));
    }

    #[test]
    fn test_unresolved_conflicts_are_skipped() {
        let local = local_save();
        let mut pending = conflict("player.money", json!(5000), json!(1), Resolution::UseCloud);
        pending.resolution = None;

        let outcome = merge(&local, &[pending]);
        assert_eq!(outcome.save.field("player.money"), Some(&json!(5000)));
        assert_eq!(outcome.applied, 0);
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let local = local_save();
        let cloud = SaveData::new(json!({"player": {"money": 1, "level": 9, "title": "Warden"}}));
        let local_before = local.clone();
        let cloud_before = cloud.clone();

        let conflicts: Vec<_> = ConflictDetector::new(["player.money", "player.level", "player.title"])
            .detect(&local, &cloud)
            .into_iter()
            .map(|c| c.with_resolution(Resolution::UseCloud))
            .collect();
        let outcome = merge(&local, &conflicts);

        assert_eq!(local, local_before);
        assert_eq!(cloud, cloud_before);
        assert_eq!(outcome.save.game_data, cloud.game_data);
    }

    #[test]
    fn test_merge_stamps_sync_bookkeeping() {
        let local = local_save();
        let outcome = merge(&local, &[]);

        assert!(outcome.save.last_saved >= local.last_saved);
        assert_eq!(outcome.save.sync_status.pending_changes, 0);
        assert_eq!(outcome.save.sync_status.last_cloud_sync, Some(outcome.save.last_saved));
    }
}
