//! Engine data model
//!
//! These types are independent of Kubernetes: the CRDs convert into a
//! [`DesiredSpec`], the remote client produces an [`ObservedState`], and a
//! reconciliation pass turns both plus the previous [`ReconciliationStatus`]
//! into a new status.

use crate::diff::diff_schema;
use crate::tree::ConfigTree;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Which kind of remote resource a spec describes
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    Index,
    Template(TemplateExtras),
}

impl ResourceKind {
    /// Static settings are only enforced for indices; template settings are
    /// always replaceable
    pub fn enforces_immutability(&self) -> bool {
        matches!(self, ResourceKind::Index)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Index => "index",
            ResourceKind::Template(_) => "template",
        }
    }

    pub fn template(&self) -> Option<&TemplateExtras> {
        match self {
            ResourceKind::Index => None,
            ResourceKind::Template(extras) => Some(extras),
        }
    }
}

/// Template-only parts of a definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateExtras {
    pub index_patterns: Vec<String>,
    /// Alias bodies in wire form, keyed by alias name
    pub aliases: BTreeMap<String, Value>,
    pub version: Option<i64>,
}

impl TemplateExtras {
    /// Whether the observed template needs this definition re-applied
    ///
    /// Alias bodies are compared leaf by leaf over the desired fields, the
    /// same way schema documents are, because the server may echo extra
    /// fields back.
    pub fn differs_from(&self, observed: &TemplateExtras) -> bool {
        if self.index_patterns != observed.index_patterns || self.version != observed.version {
            return true;
        }
        if self.aliases.len() != observed.aliases.len() {
            return true;
        }
        self.aliases.iter().any(|(name, body)| {
            let Some(seen) = observed.aliases.get(name) else {
                return true;
            };
            match (
                ConfigTree::from_document(body),
                ConfigTree::from_document(seen),
            ) {
                (Ok(want), Ok(have)) => diff_schema(&want, &have),
                _ => body != seen,
            }
        })
    }
}

/// Desired state of one remote resource, as supplied to a pass
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredSpec {
    /// Remote resource name
    pub name: String,
    /// Delete the remote resource when the desired-state object goes away
    pub drop_on_delete: bool,
    /// Sparse settings tree rooted at `index`
    pub settings: ConfigTree,
    /// Schema (mappings) document, without the ownership marker
    pub schema: Value,
    pub kind: ResourceKind,
}

impl DesiredSpec {
    pub fn deletion_target(&self) -> DeletionTarget {
        DeletionTarget::new(&self.name, self.kind.label(), self.drop_on_delete)
    }
}

/// The part of a spec the deletion path reads
///
/// Built straight from the desired-state object, so a spec whose settings or
/// mappings no longer parse can still release its remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionTarget {
    pub name: String,
    /// `index` or `template`
    pub label: &'static str,
    pub drop_on_delete: bool,
}

impl DeletionTarget {
    pub fn new(name: &str, label: &'static str, drop_on_delete: bool) -> Self {
        Self {
            name: name.to_string(),
            label,
            drop_on_delete,
        }
    }
}

/// Snapshot of the remote resource fetched at the start of a pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedState {
    /// Settings as reported by the server, leaf values already stringified
    pub settings: ConfigTree,
    pub schema: Option<Value>,
    /// Present for templates only
    pub template: Option<TemplateExtras>,
}

/// Everything needed to create (or fully replace) a remote resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePayload {
    pub settings: ConfigTree,
    /// Schema document carrying the ownership marker
    pub schema: Value,
    pub template: Option<TemplateExtras>,
}

/// Last mutating operation attempted on the remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Operation {
    Create,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => f.write_str("create"),
            Operation::Update => f.write_str("update"),
        }
    }
}

/// Status persisted on the desired-state object between passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStatus {
    /// Remote resource name the status refers to
    #[serde(default)]
    pub resource_name: String,

    /// Last attempted operation; absent until the first create attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,

    /// Whether the remote system confirmed the last operation
    #[serde(default)]
    pub acknowledged: bool,

    /// Error of the last pass, empty when it succeeded
    #[serde(default)]
    pub latest_error: String,
}

impl ReconciliationStatus {
    /// A create was attempted but never confirmed
    pub fn is_unacknowledged_create(&self) -> bool {
        self.operation == Some(Operation::Create) && !self.acknowledged
    }

    /// Operation to record when a pass fails against this previous status
    ///
    /// Only a create that is still unconfirmed stays a create. Anything else
    /// becomes an update, so a failed pass never looks like a pending create
    /// that a later pass could adopt.
    pub fn failure_operation(&self) -> Operation {
        if self.is_unacknowledged_create() {
            Operation::Create
        } else {
            Operation::Update
        }
    }

    pub(crate) fn succeeded(name: &str, operation: Operation) -> Self {
        Self {
            resource_name: name.to_string(),
            operation: Some(operation),
            acknowledged: true,
            latest_error: String::new(),
        }
    }

    pub(crate) fn failed(name: &str, operation: Operation, error: impl ToString) -> Self {
        Self {
            resource_name: name.to_string(),
            operation: Some(operation),
            acknowledged: false,
            latest_error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extras() -> TemplateExtras {
        TemplateExtras {
            index_patterns: vec!["logs-*".to_string()],
            aliases: BTreeMap::from([(
                "logs".to_string(),
                json!({"filter": {"term": {"env": "prod"}}}),
            )]),
            version: Some(3),
        }
    }

    #[test]
    fn test_status_serialization() {
        let status = ReconciliationStatus::succeeded("logs", Operation::Create);
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            json!({
                "resourceName": "logs",
                "operation": "Create",
                "acknowledged": true,
                "latestError": ""
            })
        );
    }

    #[test]
    fn test_status_defaults_from_empty_object() {
        let status: ReconciliationStatus = serde_json::from_value(json!({})).unwrap();
        assert_eq!(status, ReconciliationStatus::default());
        assert!(!status.is_unacknowledged_create());
    }

    #[test]
    fn test_unacknowledged_create() {
        let status = ReconciliationStatus::failed("logs", Operation::Create, "rejected");
        assert!(status.is_unacknowledged_create());
        assert_eq!(status.latest_error, "rejected");
    }

    #[test]
    fn test_failure_operation_never_turns_into_pending_create() {
        let created = ReconciliationStatus::succeeded("logs", Operation::Create);
        assert_eq!(created.failure_operation(), Operation::Update);
        assert_eq!(
            ReconciliationStatus::default().failure_operation(),
            Operation::Update
        );

        let pending = ReconciliationStatus::failed("logs", Operation::Create, "timeout");
        assert_eq!(pending.failure_operation(), Operation::Create);
    }

    #[test]
    fn test_template_extras_equal_with_server_additions() {
        let mut observed = extras();
        observed.aliases.insert(
            "logs".to_string(),
            json!({"filter": {"term": {"env": "prod"}}, "is_hidden": false}),
        );
        assert!(!extras().differs_from(&observed));
    }

    #[test]
    fn test_template_extras_detects_changes() {
        let mut patterns = extras();
        patterns.index_patterns.push("metrics-*".to_string());
        assert!(patterns.differs_from(&extras()));

        let mut version = extras();
        version.version = Some(4);
        assert!(version.differs_from(&extras()));

        let mut dropped_alias = extras();
        dropped_alias.aliases.clear();
        assert!(dropped_alias.differs_from(&extras()));
    }

    #[test]
    fn test_kind_immutability() {
        assert!(ResourceKind::Index.enforces_immutability());
        assert!(!ResourceKind::Template(extras()).enforces_immutability());
        assert_eq!(ResourceKind::Template(extras()).label(), "template");
    }
}
