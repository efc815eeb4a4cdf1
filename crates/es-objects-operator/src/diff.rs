//! Desired vs observed comparison
//!
//! Settings are compared over the paths the server reports: the desired tree
//! is sparse and only mentions what the operator cares about, while the server
//! expands defaults. Schema documents are compared the other way round, over
//! the desired paths, because the server keeps fields it was never asked to
//! drop.

use crate::error::{OperatorError, Result};
use crate::tree::{ConfigPath, ConfigTree};
use tracing::debug;

/// Index settings that can only be set when the index is created
pub const STATIC_INDEX_SETTINGS: [&str; 6] = [
    "index.number_of_shards",
    "index.shard.check_on_startup",
    "index.codec",
    "index.routing_partition_size",
    "index.load_fixed_bitset_filters_eagerly",
    "index.hidden",
];

pub fn is_static_setting(path: &ConfigPath) -> bool {
    let dotted = path.to_string();
    STATIC_INDEX_SETTINGS.contains(&dotted.as_str())
}

/// Report whether `desired` asks for anything `observed` does not already have
///
/// With `enforce_immutability` set, a difference on a static setting is an
/// [`OperatorError::ImmutableSetting`] even when dynamic settings changed too,
/// so a static change is never silently dropped from an update.
pub fn diff_settings(
    desired: &ConfigTree,
    observed: &ConfigTree,
    enforce_immutability: bool,
) -> Result<bool> {
    let mut changed = false;

    for path in observed.leaf_paths() {
        let Some(want) = desired.normalized(&path) else {
            continue;
        };
        let Some(have) = observed.normalized(&path) else {
            continue;
        };
        if want == have {
            continue;
        }

        debug!(path = %path, observed = %have, desired = %want, "Setting differs");

        if !enforce_immutability {
            return Ok(true);
        }
        if is_static_setting(&path) {
            return Err(OperatorError::ImmutableSetting {
                path: path.to_string(),
                observed: have,
                desired: want,
            });
        }
        changed = true;
    }

    Ok(changed)
}

/// Copy of `settings` without any static index setting
pub fn strip_static_settings(settings: &ConfigTree) -> ConfigTree {
    let mut stripped = settings.clone();
    for key in STATIC_INDEX_SETTINGS {
        stripped.remove(&ConfigPath::parse(key));
    }
    stripped
}

/// Report whether any leaf of the desired schema is missing or different
/// in the observed schema
pub fn diff_schema(desired: &ConfigTree, observed: &ConfigTree) -> bool {
    desired.leaf_paths().iter().any(|path| {
        match (desired.normalized(path), observed.normalized(path)) {
            (Some(want), Some(have)) => want != have,
            _ => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> ConfigTree {
        ConfigTree::from_json(value).unwrap()
    }

    #[test]
    fn test_no_change_when_values_normalize_equal() {
        let desired = tree(json!({"index": {"number_of_shards": 32, "number_of_replicas": 1}}));
        let observed = tree(json!({
            "index": {"number_of_shards": "32", "number_of_replicas": "1", "uuid": "abc"}
        }));
        assert!(!diff_settings(&desired, &observed, true).unwrap());
    }

    #[test]
    fn test_dynamic_change_detected() {
        let desired = tree(json!({"index": {"number_of_replicas": 2}}));
        let observed = tree(json!({"index": {"number_of_replicas": "1"}}));
        assert!(diff_settings(&desired, &observed, true).unwrap());
    }

    #[test]
    fn test_static_change_rejected_for_indices() {
        let desired = tree(json!({"index": {"number_of_shards": 33}}));
        let observed = tree(json!({"index": {"number_of_shards": "32"}}));
        let err = diff_settings(&desired, &observed, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "can't change static setting index.number_of_shards from '32' to '33'"
        );
    }

    #[test]
    fn test_static_change_rejected_alongside_dynamic_change() {
        let desired = tree(json!({"index": {"number_of_replicas": 2, "codec": "best_compression"}}));
        let observed = tree(json!({"index": {"number_of_replicas": "1", "codec": "default"}}));
        assert!(matches!(
            diff_settings(&desired, &observed, true),
            Err(OperatorError::ImmutableSetting { .. })
        ));
    }

    #[test]
    fn test_static_change_allowed_without_enforcement() {
        let desired = tree(json!({"index": {"number_of_shards": 33}}));
        let observed = tree(json!({"index": {"number_of_shards": "32"}}));
        assert!(diff_settings(&desired, &observed, false).unwrap());
    }

    #[test]
    fn test_desired_keys_unknown_to_server_are_ignored() {
        let desired = tree(json!({"index": {"max_ngram_diff": 5}}));
        let observed = tree(json!({"index": {"number_of_shards": "1"}}));
        assert!(!diff_settings(&desired, &observed, true).unwrap());
    }

    #[test]
    fn test_empty_observed_reports_no_change() {
        let desired = tree(json!({"index": {"number_of_shards": 3}}));
        assert!(!diff_settings(&desired, &ConfigTree::new(), true).unwrap());
    }

    #[test]
    fn test_strip_static_settings() {
        let settings = tree(json!({
            "index": {
                "number_of_shards": 3,
                "shard": {"check_on_startup": "checksum"},
                "codec": "default",
                "routing_partition_size": 2,
                "load_fixed_bitset_filters_eagerly": "true",
                "hidden": "false",
                "number_of_replicas": 2,
                "routing": {"allocation": {"enable": "all"}}
            }
        }));
        let stripped = strip_static_settings(&settings);
        assert_eq!(
            stripped,
            tree(json!({
                "index": {"number_of_replicas": 2, "routing": {"allocation": {"enable": "all"}}}
            }))
        );
    }

    #[test]
    fn test_is_static_setting() {
        assert!(is_static_setting(&ConfigPath::parse("index.codec")));
        assert!(!is_static_setting(&ConfigPath::parse("index.number_of_replicas")));
    }

    #[test]
    fn test_diff_schema() {
        let observed = ConfigTree::from_document(&json!({
            "_meta": {"managed-by": "me"},
            "properties": {"title": {"type": "text"}, "extra": {"type": "keyword"}}
        }))
        .unwrap();

        let same = ConfigTree::from_document(&json!({
            "_meta": {"managed-by": "me"},
            "properties": {"title": {"type": "text"}}
        }))
        .unwrap();
        assert!(!diff_schema(&same, &observed));

        let added = ConfigTree::from_document(&json!({
            "properties": {"title": {"type": "text"}, "body": {"type": "text"}}
        }))
        .unwrap();
        assert!(diff_schema(&added, &observed));

        let retyped = ConfigTree::from_document(&json!({
            "properties": {"title": {"type": "keyword"}}
        }))
        .unwrap();
        assert!(diff_schema(&retyped, &observed));
    }
}
