//! Dotted-path access into the game payload
//!
//! Paths address nested object keys: `player.money` reads
//! `gameData["player"]["money"]`. Array indexing is not supported.

use serde_json::{Map, Value};

/// Look up a value by dotted path
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |node, key| node.as_object()?.get(key))
}

/// Write a value at a dotted path, creating intermediate objects as needed.
///
/// Returns `false` when an intermediate node exists but is not an object;
/// the tree is left untouched in that case.
pub fn set(root: &mut Value, path: &str, value: Value) -> bool {
    let mut keys = path.split('.').peekable();
    let mut node = root;

    while let Some(key) = keys.next() {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return false;
        };

        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return true;
        }

        node = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested() {
        let data = json!({"player": {"money": 5000, "stats": {"runs": 3}}});

        assert_eq!(get(&data, "player.money"), Some(&json!(5000)));
        assert_eq!(get(&data, "player.stats.runs"), Some(&json!(3)));
        assert_eq!(get(&data, "player.missing"), None);
        assert_eq!(get(&data, "player.money.deeper"), None);
    }

    #[test]
    fn test_set_overwrites_and_creates() {
        let mut data = json!({"player": {"money": 5000}});

        assert!(set(&mut data, "player.money", json!(4000)));
        assert!(set(&mut data, "player.stats.runs", json!(9)));

        assert_eq!(data, json!({"player": {"money": 4000, "stats": {"runs": 9}}}));
    }

    #[test]
    fn test_set_refuses_non_object_parent() {
        let mut data = json!({"player": 7});

        assert!(!set(&mut data, "player.money", json!(1)));
        assert_eq!(data, json!({"player": 7}));
    }
}
