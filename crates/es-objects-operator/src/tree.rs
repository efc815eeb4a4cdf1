//! Configuration trees
//!
//! Settings and schema documents arrive as arbitrary JSON. They are converted
//! into a tagged tree (`ConfigValue`) so every traversal is an exhaustive
//! match instead of a chain of runtime type checks.
//!
//! Two views are built on top of the tree:
//!
//! - **Leaf paths**: every non-map value addressed by its path from the root.
//!   Lists are opaque leaves, matching how the remote settings API reports them.
//! - **Normalized values**: a canonical string per leaf so typed desired values
//!   (`5`, `true`) compare equal to the stringified values the server echoes
//!   back (`"5"`, `"true"`).

use crate::error::{OperatorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A single node of a configuration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// Opaque leaf, never traversed element by element
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Canonical text used for equality checks between desired and observed values
    pub fn normalized(&self) -> String {
        match self {
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Number(n) => normalize_number(n),
            ConfigValue::Null => "null".to_string(),
            ConfigValue::List(_) | ConfigValue::Map(_) => Value::from(self.clone()).to_string(),
        }
    }

    /// Borrow the children if this node is a map
    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Follow `segments` down from this node
    pub fn lookup(&self, segments: &[String]) -> Option<&ConfigValue> {
        match segments.split_first() {
            None => Some(self),
            Some((head, rest)) => match self {
                ConfigValue::Map(children) => children.get(head)?.lookup(rest),
                _ => None,
            },
        }
    }

    fn collect_leaves(&self, prefix: &mut Vec<String>, out: &mut Vec<ConfigPath>) {
        match self {
            ConfigValue::Map(children) => {
                for (key, child) in children {
                    prefix.push(key.clone());
                    child.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
            _ => out.push(ConfigPath(prefix.clone())),
        }
    }
}

fn normalize_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        // 32.0 and 32 must render the same
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", f as i64)
        }
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(b),
            Value::Number(n) => ConfigValue::Number(n),
            Value::String(s) => ConfigValue::String(s),
            Value::Array(items) => {
                ConfigValue::List(items.into_iter().map(ConfigValue::from).collect())
            }
            Value::Object(map) => ConfigValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ConfigValue> for Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Null => Value::Null,
            ConfigValue::Bool(b) => Value::Bool(b),
            ConfigValue::Number(n) => Value::Number(n),
            ConfigValue::String(s) => Value::String(s),
            ConfigValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            ConfigValue::Map(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Path to a leaf, one segment per map level
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigPath(Vec<String>);

impl ConfigPath {
    /// Split a dotted path such as `index.routing.allocation.enable`
    pub fn parse(dotted: &str) -> Self {
        Self(dotted.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Root of a settings or schema tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(BTreeMap<String, ConfigValue>);

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a JSON object, expanding dotted keys into nested maps
    ///
    /// `{"index.number_of_shards": 3}` and `{"index": {"number_of_shards": 3}}`
    /// produce the same tree.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(OperatorError::Structural(
                "configuration root must be an object".to_string(),
            ));
        };
        let mut tree = ConfigTree::new();
        for (key, child) in map {
            tree.merge_at(&ConfigPath::parse(&key), expand(child)?)?;
        }
        Ok(tree)
    }

    /// Build a tree from a JSON object without touching dotted keys
    ///
    /// Used for schema documents where dots may be part of field names.
    pub fn from_document(value: &Value) -> Result<Self> {
        match ConfigValue::from(value.clone()) {
            ConfigValue::Map(map) => Ok(Self(map)),
            _ => Err(OperatorError::Structural(
                "document root must be an object".to_string(),
            )),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::from(ConfigValue::Map(self.0.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    /// Every leaf path in the tree; an empty tree has none
    pub fn leaf_paths(&self) -> Vec<ConfigPath> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        for (key, child) in &self.0 {
            prefix.push(key.clone());
            child.collect_leaves(&mut prefix, &mut out);
            prefix.pop();
        }
        out
    }

    /// Value at `path`, or `None` when a segment is missing or an
    /// intermediate node is not a map
    pub fn lookup(&self, path: &ConfigPath) -> Option<&ConfigValue> {
        let (head, rest) = path.segments().split_first()?;
        self.0.get(head)?.lookup(rest)
    }

    /// Normalized text of the value at `path`
    pub fn normalized(&self, path: &ConfigPath) -> Option<String> {
        self.lookup(path).map(ConfigValue::normalized)
    }

    /// Remove the value at `path`, pruning maps left empty by the removal
    pub fn remove(&mut self, path: &ConfigPath) -> Option<ConfigValue> {
        let (head, rest) = path.segments().split_first()?;
        if rest.is_empty() {
            return self.0.remove(head);
        }
        let removed = match self.0.get_mut(head)? {
            ConfigValue::Map(children) => remove_nested(children, rest),
            _ => None,
        };
        if matches!(self.0.get(head), Some(ConfigValue::Map(m)) if m.is_empty()) {
            self.0.remove(head);
        }
        removed
    }

    fn merge_at(&mut self, path: &ConfigPath, value: ConfigValue) -> Result<()> {
        let mut root = ConfigValue::Map(std::mem::take(&mut self.0));
        let merged = merge_into(&mut root, path.segments(), value);
        if let ConfigValue::Map(map) = root {
            self.0 = map;
        }
        merged.map_err(|_| {
            OperatorError::Structural(format!("conflicting values for setting {path}"))
        })
    }
}

fn expand(value: Value) -> Result<ConfigValue> {
    match value {
        Value::Object(map) => {
            let mut node = ConfigValue::Map(BTreeMap::new());
            for (key, child) in map {
                let path = ConfigPath::parse(&key);
                merge_into(&mut node, path.segments(), expand(child)?).map_err(|_| {
                    OperatorError::Structural(format!("conflicting values for setting {key}"))
                })?;
            }
            Ok(node)
        }
        other => Ok(ConfigValue::from(other)),
    }
}

/// Insert `value` at `segments` below `node`, merging maps that meet
fn merge_into(
    node: &mut ConfigValue,
    segments: &[String],
    value: ConfigValue,
) -> std::result::Result<(), ()> {
    let ConfigValue::Map(children) = node else {
        return Err(());
    };
    let Some((head, rest)) = segments.split_first() else {
        return Err(());
    };
    if rest.is_empty() {
        if !children.contains_key(head) {
            children.insert(head.clone(), value);
            return Ok(());
        }
        let ConfigValue::Map(incoming) = value else {
            return Err(());
        };
        let existing = children.get_mut(head).ok_or(())?;
        if !matches!(existing, ConfigValue::Map(_)) {
            return Err(());
        }
        for (key, child) in incoming {
            merge_into(existing, std::slice::from_ref(&key), child)?;
        }
        return Ok(());
    }
    let child = children
        .entry(head.clone())
        .or_insert_with(|| ConfigValue::Map(BTreeMap::new()));
    merge_into(child, rest, value)
}

fn remove_nested(
    children: &mut BTreeMap<String, ConfigValue>,
    segments: &[String],
) -> Option<ConfigValue> {
    let (head, rest) = segments.split_first()?;
    if rest.is_empty() {
        return children.remove(head);
    }
    let removed = match children.get_mut(head)? {
        ConfigValue::Map(grandchildren) => remove_nested(grandchildren, rest),
        _ => None,
    };
    if matches!(children.get(head), Some(ConfigValue::Map(m)) if m.is_empty()) {
        children.remove(head);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> ConfigTree {
        ConfigTree::from_json(value).unwrap()
    }

    fn dotted(paths: Vec<ConfigPath>) -> Vec<String> {
        let mut out: Vec<String> = paths.iter().map(ToString::to_string).collect();
        out.sort();
        out
    }

    #[test]
    fn test_leaf_paths_nested() {
        let t = tree(json!({"index": {"number_of_shards": "55"}}));
        assert_eq!(dotted(t.leaf_paths()), vec!["index.number_of_shards"]);
    }

    #[test]
    fn test_leaf_paths_lists_are_opaque() {
        let t = tree(json!({
            "index": {"arr": ["55"], "map": {"int": 66, "bool": true, "str": "string"}}
        }));
        assert_eq!(
            dotted(t.leaf_paths()),
            vec!["index.arr", "index.map.bool", "index.map.int", "index.map.str"]
        );
    }

    #[test]
    fn test_leaf_paths_empty_tree() {
        assert!(tree(json!({})).leaf_paths().is_empty());
    }

    #[test]
    fn test_dotted_keys_are_expanded() {
        let flat = tree(json!({"index.number_of_shards": 3, "index.codec": "default"}));
        let nested = tree(json!({"index": {"number_of_shards": 3, "codec": "default"}}));
        assert_eq!(flat, nested);
    }

    #[test]
    fn test_conflicting_dotted_keys_rejected() {
        let err = ConfigTree::from_json(json!({"index": 1, "index.codec": "default"}));
        assert!(matches!(err, Err(OperatorError::Structural(_))));
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(ConfigTree::from_json(json!([1, 2])).is_err());
        assert!(ConfigTree::from_document(&json!("text")).is_err());
    }

    #[test]
    fn test_normalized_numbers_match_strings() {
        let typed = tree(json!({"index": {"number_of_shards": 5, "ratio": 1.5, "flag": true}}));
        let stringly =
            tree(json!({"index": {"number_of_shards": "5", "ratio": "1.5", "flag": "true"}}));
        for path in ["index.number_of_shards", "index.ratio", "index.flag"] {
            let path = ConfigPath::parse(path);
            assert_eq!(typed.normalized(&path), stringly.normalized(&path));
        }
    }

    #[test]
    fn test_normalized_integral_float() {
        let t = tree(json!({"a": 32.0}));
        assert_eq!(t.normalized(&ConfigPath::parse("a")).as_deref(), Some("32"));
    }

    #[test]
    fn test_normalized_composite_is_deterministic() {
        let t = tree(json!({"index": {"number_of_shards": {"some": true, "other": 1}}}));
        let path = ConfigPath::parse("index.number_of_shards");
        assert_eq!(
            t.normalized(&path).as_deref(),
            Some(r#"{"other":1,"some":true}"#)
        );
    }

    #[test]
    fn test_lookup_missing_or_wrong_shape() {
        let t = tree(json!({"index": {"number_of_shards": {"some": true}}}));
        assert!(t
            .normalized(&ConfigPath::parse("index.number_of_shards.some.get"))
            .is_none());
        assert!(t.normalized(&ConfigPath::parse("indexBad")).is_none());
        let leaf = tree(json!({"index": 55}));
        assert!(leaf.normalized(&ConfigPath::parse("index.number_of_shards")).is_none());
    }

    #[test]
    fn test_remove_prunes_empty_parents() {
        let mut t = tree(json!({
            "index": {"shard": {"check_on_startup": "true"}, "number_of_replicas": 2}
        }));
        let removed = t.remove(&ConfigPath::parse("index.shard.check_on_startup"));
        assert_eq!(removed, Some(ConfigValue::String("true".to_string())));
        assert_eq!(t, tree(json!({"index": {"number_of_replicas": 2}})));

        t.remove(&ConfigPath::parse("index.number_of_replicas"));
        assert!(t.is_empty());
    }

    #[test]
    fn test_json_round_trip_preserves_types() {
        let source = json!({"index": {"number_of_shards": 3, "hidden": "true", "list": [1, "a"]}});
        assert_eq!(tree(source.clone()).to_json(), source);
    }
}
