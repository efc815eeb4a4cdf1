//! Custom Resource Definitions for the Elasticsearch objects operator
//!
//! `ElasticSearchIndex` and `ElasticSearchTemplate` describe an index or a
//! legacy index template. Field names follow the Elasticsearch API
//! (`number_of_shards`, `drop_on_delete`) rather than Kubernetes camelCase so
//! manifests read like the settings they produce.

use crate::error::{OperatorError, Result};
use crate::model::{DesiredSpec, ReconciliationStatus, ResourceKind, TemplateExtras};
use crate::tree::ConfigTree;
use kube::{CustomResource, CustomResourceExt};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

/// API group shared by both resources
pub const API_GROUP: &str = "xo.90poe.io";

/// Index names as accepted by the create index API
static ES_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[^-_+A-Z][^A-Z\\/*?"<> ,|#]{1,254}$"#).unwrap());

fn validate_es_name(name: &str) -> std::result::Result<(), ValidationError> {
    if ES_NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_es_name")
            .with_message(format!("'{}' is not a valid Elasticsearch name", name).into()))
    }
}

fn validate_one_of(
    value: &str,
    allowed: &[&str],
    code: &'static str,
) -> std::result::Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(code).with_message(
            format!("'{}' must be one of: {}", value, allowed.join(", ")).into(),
        ))
    }
}

fn validate_bool_text(value: &str) -> std::result::Result<(), ValidationError> {
    validate_one_of(value, &["true", "false"], "invalid_boolean")
}

fn validate_check_on_startup(value: &str) -> std::result::Result<(), ValidationError> {
    validate_one_of(value, &["true", "false", "checksum"], "invalid_check_on_startup")
}

fn validate_codec(value: &str) -> std::result::Result<(), ValidationError> {
    validate_one_of(value, &["default", "best_compression"], "invalid_codec")
}

fn validate_allocation_enable(value: &str) -> std::result::Result<(), ValidationError> {
    validate_one_of(
        value,
        &["all", "primaries", "new_primaries", "none"],
        "invalid_allocation",
    )
}

fn validate_rebalance_enable(value: &str) -> std::result::Result<(), ValidationError> {
    validate_one_of(
        value,
        &["all", "primaries", "replicas", "none"],
        "invalid_rebalance",
    )
}

fn validate_index_patterns(patterns: &[String]) -> std::result::Result<(), ValidationError> {
    if patterns.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::new("empty_index_pattern")
            .with_message("index patterns must not be empty strings".into()));
    }
    Ok(())
}

/// ElasticSearchIndex custom resource definition
///
/// Declares one index. The operator creates it with the given settings and
/// mappings and keeps dynamic settings and mappings in sync afterwards.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[kube(
    group = "xo.90poe.io",
    version = "v1alpha1",
    kind = "ElasticSearchIndex",
    plural = "elasticsearchindices",
    shortname = "esindex",
    namespaced,
    status = "ReconciliationStatus",
    printcolumn = r#"{"name":"Index", "type":"string", "jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Operation", "type":"string", "jsonPath":".status.operation"}"#,
    printcolumn = r#"{"name":"Acknowledged", "type":"boolean", "jsonPath":".status.acknowledged"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ElasticSearchIndexSpec {
    /// Name of the index
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    #[validate(custom(function = "validate_es_name"))]
    pub name: String,

    /// Delete the index when this object is deleted
    #[serde(default)]
    pub drop_on_delete: bool,

    /// Index settings
    #[serde(default)]
    #[validate(nested)]
    pub settings: IndexSettings,

    /// Index mappings as a JSON document
    #[serde(default)]
    pub mappings: String,
}

/// ElasticSearchTemplate custom resource definition
///
/// Declares one legacy index template (`/_template`). Template settings are
/// never treated as immutable.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[kube(
    group = "xo.90poe.io",
    version = "v1alpha1",
    kind = "ElasticSearchTemplate",
    plural = "elasticsearchtemplates",
    shortname = "estemplate",
    namespaced,
    status = "ReconciliationStatus",
    printcolumn = r#"{"name":"Template", "type":"string", "jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Operation", "type":"string", "jsonPath":".status.operation"}"#,
    printcolumn = r#"{"name":"Acknowledged", "type":"boolean", "jsonPath":".status.acknowledged"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ElasticSearchTemplateSpec {
    /// Name of the template
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    #[validate(custom(function = "validate_es_name"))]
    pub name: String,

    /// Delete the template when this object is deleted
    #[serde(default)]
    pub drop_on_delete: bool,

    /// Wildcard expressions matching the names of indices the template applies to
    #[validate(length(min = 1, message = "at least one index pattern is required"))]
    #[validate(custom(function = "validate_index_patterns"))]
    pub index_patterns: Vec<String>,

    /// Aliases added to indices created from the template
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, AliasSpec>,

    /// Settings applied to matching indices
    #[serde(default)]
    #[validate(nested)]
    pub settings: IndexSettings,

    /// Mappings applied to matching indices as a JSON document
    #[serde(default)]
    pub mappings: String,

    /// Template version for external bookkeeping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "version must be at least 1"))]
    pub version: Option<i64>,
}

/// Alias declared by a template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AliasSpec {
    /// Query limiting the documents visible through the alias, as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Route writes through this alias to the index
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_write_index: bool,

    /// Routing value for both indexing and search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_routing: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_routing: Option<String>,
}

impl AliasSpec {
    /// Body sent to the template API
    ///
    /// `routing` is expanded into `index_routing` and `search_routing`, which
    /// is how the server stores and reports it.
    pub fn to_wire(&self, alias: &str) -> Result<Value> {
        let mut body = Map::new();

        if let Some(filter) = self.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            let parsed: Value = serde_json::from_str(filter).map_err(|e| {
                OperatorError::Structural(format!("can't parse filter of alias {alias}: {e}"))
            })?;
            body.insert("filter".to_string(), parsed);
        }
        if self.is_write_index {
            body.insert("is_write_index".to_string(), Value::Bool(true));
        }

        let index_routing = self.index_routing.as_ref().or(self.routing.as_ref());
        let search_routing = self.search_routing.as_ref().or(self.routing.as_ref());
        if let Some(routing) = index_routing {
            body.insert("index_routing".to_string(), json!(routing));
        }
        if let Some(routing) = search_routing {
            body.insert("search_routing".to_string(), json!(routing));
        }

        Ok(Value::Object(body))
    }
}

/// Index settings, static and dynamic
///
/// Every field is optional and unset fields are left out of the request, so
/// the operator only has an opinion about what the manifest mentions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct IndexSettings {
    /// Number of primary shards (static)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1024, message = "number_of_shards must be between 1 and 1024"))]
    pub number_of_shards: Option<i32>,

    /// Shard checks (static)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub shard: Option<ShardSettings>,

    /// Stored fields compression (static)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_codec"))]
    pub codec: Option<String>,

    /// Number of shards a custom routing value can go to (static)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1023, message = "routing_partition_size must be between 1 and 1023"))]
    pub routing_partition_size: Option<i32>,

    /// Preload cached filters for nested queries (static)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_bool_text"))]
    pub load_fixed_bitset_filters_eagerly: Option<String>,

    /// Hide the index from wildcard expressions (static)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_bool_text"))]
    pub hidden: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0, message = "number_of_replicas must not be negative"))]
    pub number_of_replicas: Option<i32>,

    /// Dash delimited bounds such as `0-5` or `0-all`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_expand_replicas: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSettings>,

    /// Refresh interval such as `1s`, `-1` disables refreshes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_result_window: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_inner_result_window: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_rescore_window: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_docvalue_fields_search: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_script_fields: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_ngram_diff: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_shingle_diff: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub blocks: Option<BlockSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_refresh_listeners: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub analyze: Option<AnalyzeSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub highlight: Option<HighlightSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_terms_count: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_regex_length: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub routing: Option<RoutingSettings>,

    /// How long a deleted document's version stays available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_deletes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pipeline: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_pipeline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ShardSettings {
    /// `true`, `false` or `checksum`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_check_on_startup"))]
    pub check_on_startup: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle: Option<SearchIdleSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchIdleSettings {
    /// Time without searches before a shard is considered idle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// Index blocks, each `true` or `false`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct BlockSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_bool_text"))]
    pub read_only: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_bool_text"))]
    pub read_only_allow_delete: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_bool_text"))]
    pub read: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_bool_text"))]
    pub write: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_bool_text"))]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct AnalyzeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_token_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct HighlightSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_analyzed_offset: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RoutingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub allocation: Option<AllocationSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub rebalance: Option<RebalanceSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct AllocationSettings {
    /// `all`, `primaries`, `new_primaries` or `none`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_allocation_enable"))]
    pub enable: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RebalanceSettings {
    /// `all`, `primaries`, `replicas` or `none`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_rebalance_enable"))]
    pub enable: Option<String>,
}

impl IndexSettings {
    /// Sparse settings tree rooted at `index`
    pub fn to_tree(&self) -> Result<ConfigTree> {
        let settings = serde_json::to_value(self)?;
        ConfigTree::from_json(json!({ "index": settings }))
    }
}

/// Parse a mappings document; an empty string means no mappings
pub fn parse_mappings(mappings: &str) -> Result<Value> {
    if mappings.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let document: Value = serde_json::from_str(mappings)
        .map_err(|e| OperatorError::Structural(format!("can't parse mappings: {e}")))?;
    if !document.is_object() {
        return Err(OperatorError::Structural(
            "mappings must be a JSON object".to_string(),
        ));
    }
    Ok(document)
}

fn validate_spec(spec: &impl Validate) -> Result<()> {
    spec.validate()
        .map_err(|errors| OperatorError::ValidationError(errors.to_string()))
}

impl ElasticSearchIndexSpec {
    /// Validate and convert into the engine's desired state
    pub fn to_desired(&self) -> Result<DesiredSpec> {
        validate_spec(self)?;
        Ok(DesiredSpec {
            name: self.name.clone(),
            drop_on_delete: self.drop_on_delete,
            settings: self.settings.to_tree()?,
            schema: parse_mappings(&self.mappings)?,
            kind: ResourceKind::Index,
        })
    }
}

impl ElasticSearchTemplateSpec {
    /// Validate and convert into the engine's desired state
    pub fn to_desired(&self) -> Result<DesiredSpec> {
        validate_spec(self)?;
        let aliases = self
            .aliases
            .iter()
            .map(|(name, alias)| Ok((name.clone(), alias.to_wire(name)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(DesiredSpec {
            name: self.name.clone(),
            drop_on_delete: self.drop_on_delete,
            settings: self.settings.to_tree()?,
            schema: parse_mappings(&self.mappings)?,
            kind: ResourceKind::Template(TemplateExtras {
                index_patterns: self.index_patterns.clone(),
                aliases,
                version: self.version,
            }),
        })
    }
}

/// Both CRDs as a multi-document YAML stream
pub fn crds_yaml() -> Result<String> {
    let index = serde_yaml::to_string(&ElasticSearchIndex::crd())?;
    let template = serde_yaml::to_string(&ElasticSearchTemplate::crd())?;
    Ok(format!("{index}---\n{template}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ConfigPath;

    fn index_spec() -> ElasticSearchIndexSpec {
        serde_yaml::from_str(
            r#"
name: logs-2024
drop_on_delete: true
settings:
  number_of_shards: 3
  number_of_replicas: 1
  routing:
    allocation:
      enable: primaries
mappings: '{"properties": {"message": {"type": "text"}}}'
"#,
        )
        .unwrap()
    }

    fn template_spec() -> ElasticSearchTemplateSpec {
        serde_yaml::from_str(
            r#"
name: logs
index_patterns: ["logs-*"]
aliases:
  all-logs:
    filter: '{"term": {"env": "prod"}}'
    routing: "1"
settings:
  number_of_shards: 1
mappings: '{"properties": {}}'
version: 2
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_crd_generation() {
        let crd = ElasticSearchIndex::crd();
        assert_eq!(crd.spec.group, API_GROUP);
        assert_eq!(crd.spec.names.plural, "elasticsearchindices");
        assert_eq!(crd.spec.names.short_names, Some(vec!["esindex".to_string()]));

        let crd = ElasticSearchTemplate::crd();
        assert_eq!(crd.spec.names.kind, "ElasticSearchTemplate");
        assert_eq!(crd.spec.names.plural, "elasticsearchtemplates");
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
    }

    #[test]
    fn test_crds_yaml_contains_both_kinds() {
        let yaml = crds_yaml().unwrap();
        assert!(yaml.contains("kind: ElasticSearchIndex"));
        assert!(yaml.contains("kind: ElasticSearchTemplate"));
        assert!(yaml.contains("\n---\n"));
    }

    #[test]
    fn test_valid_specs() {
        assert!(index_spec().validate().is_ok());
        assert!(template_spec().validate().is_ok());
    }

    #[test]
    fn test_es_name_validation() {
        assert!(validate_es_name("logs-2024.01").is_ok());
        assert!(validate_es_name("Logs").is_err());
        assert!(validate_es_name("-logs").is_err());
        assert!(validate_es_name("_logs").is_err());
        assert!(validate_es_name("logs*").is_err());
        assert!(validate_es_name("lo gs").is_err());
        assert!(validate_es_name("l").is_err());
    }

    #[test]
    fn test_settings_validation() {
        let mut spec = index_spec();
        spec.settings.number_of_shards = Some(2000);
        assert!(spec.validate().is_err());

        let mut spec = index_spec();
        spec.settings.codec = Some("lz4".to_string());
        assert!(spec.validate().is_err());

        let mut spec = index_spec();
        spec.settings.blocks = Some(BlockSettings {
            write: Some("yes".to_string()),
            ..Default::default()
        });
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_template_validation() {
        let mut spec = template_spec();
        spec.index_patterns.clear();
        assert!(spec.validate().is_err());

        let mut spec = template_spec();
        spec.version = Some(0);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_index_to_desired_is_sparse() {
        let desired = index_spec().to_desired().unwrap();
        assert_eq!(desired.kind, ResourceKind::Index);
        assert!(desired.drop_on_delete);

        let mut paths: Vec<String> = desired
            .settings
            .leaf_paths()
            .iter()
            .map(ToString::to_string)
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "index.number_of_replicas",
                "index.number_of_shards",
                "index.routing.allocation.enable",
            ]
        );
        assert_eq!(
            desired
                .settings
                .normalized(&ConfigPath::parse("index.number_of_shards")),
            Some("3".to_string())
        );
        assert_eq!(
            desired.schema,
            json!({"properties": {"message": {"type": "text"}}})
        );
    }

    #[test]
    fn test_invalid_spec_is_validation_error() {
        let mut spec = index_spec();
        spec.name = "UPPER".to_string();
        assert!(matches!(
            spec.to_desired(),
            Err(OperatorError::ValidationError(_))
        ));
    }

    #[test]
    fn test_malformed_mappings_are_structural() {
        let mut spec = index_spec();
        spec.mappings = "{not json".to_string();
        assert!(matches!(
            spec.to_desired(),
            Err(OperatorError::Structural(_))
        ));

        spec.mappings = "[1, 2]".to_string();
        assert!(matches!(
            spec.to_desired(),
            Err(OperatorError::Structural(_))
        ));

        spec.mappings = String::new();
        assert_eq!(spec.to_desired().unwrap().schema, json!({}));
    }

    #[test]
    fn test_template_to_desired() {
        let desired = template_spec().to_desired().unwrap();
        let extras = desired.kind.template().unwrap();
        assert_eq!(extras.index_patterns, vec!["logs-*".to_string()]);
        assert_eq!(extras.version, Some(2));
        assert_eq!(
            extras.aliases.get("all-logs"),
            Some(&json!({
                "filter": {"term": {"env": "prod"}},
                "index_routing": "1",
                "search_routing": "1"
            }))
        );
        assert!(!desired.kind.enforces_immutability());
    }

    #[test]
    fn test_alias_explicit_routing_wins() {
        let alias = AliasSpec {
            routing: Some("1".to_string()),
            search_routing: Some("2".to_string()),
            is_write_index: true,
            ..Default::default()
        };
        assert_eq!(
            alias.to_wire("a").unwrap(),
            json!({"is_write_index": true, "index_routing": "1", "search_routing": "2"})
        );
    }

    #[test]
    fn test_alias_bad_filter() {
        let alias = AliasSpec {
            filter: Some("{".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            alias.to_wire("a"),
            Err(OperatorError::Structural(_))
        ));
    }

    #[test]
    fn test_status_round_trip_through_resource() {
        let mut index = ElasticSearchIndex::new("logs", index_spec());
        index.status = Some(ReconciliationStatus::default());
        let value = serde_json::to_value(&index).unwrap();
        assert_eq!(value["spec"]["drop_on_delete"], json!(true));
        assert_eq!(value["status"]["acknowledged"], json!(false));
    }
}
