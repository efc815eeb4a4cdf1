//! Reconciliation state machine
//!
//! One pass compares a [`DesiredSpec`] with the remote resource and issues
//! the mutating calls needed to converge it. The pass never touches
//! Kubernetes: it returns a [`PassOutcome`] carrying the new status and what
//! to do with the finalizer, and the controller persists both.
//!
//! Rejections from the remote system (4xx, `acknowledged: false`, immutable
//! settings, foreign resources, malformed documents) are recorded in the
//! returned status. Only failures to read the remote state are returned as
//! errors so the caller can retry the pass.

use crate::diff::{diff_schema, diff_settings, strip_static_settings};
use crate::error::{OperatorError, Result};
use crate::es_client::{EsError, ResourceClient};
use crate::model::{
    DeletionTarget, DesiredSpec, ObservedState, Operation, ReconciliationStatus, ResourcePayload,
};
use crate::ownership::{annotate, is_owned};
use crate::tree::ConfigTree;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What the caller should do with the desired-state object's finalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerChange {
    /// Add it if missing
    Ensure,
    /// Remove it; the object may go away
    Remove,
    Unchanged,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutcome {
    pub status: ReconciliationStatus,
    pub finalizer: FinalizerChange,
    /// Human readable summary of what the pass did
    pub message: String,
}

impl PassOutcome {
    /// Whether the pass ended with an error recorded in the status
    pub fn is_failure(&self) -> bool {
        !self.status.latest_error.is_empty()
    }
}

/// Lists the external names declared by the other live desired-state objects
/// of the same kind
#[async_trait]
pub trait DesiredStateLister: Send + Sync {
    async fn sibling_names(&self) -> Result<Vec<String>>;
}

/// Drives passes for one resource kind against one remote client
#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn ResourceClient>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    /// Converge the remote resource towards `desired`
    #[instrument(skip_all, fields(resource = %desired.name, kind = desired.kind.label()))]
    pub async fn reconcile(
        &self,
        desired: &DesiredSpec,
        previous: &ReconciliationStatus,
    ) -> Result<PassOutcome> {
        let observed = self.observe(&desired.name).await?;

        let Some(observed) = observed else {
            return Ok(self.create(desired).await);
        };

        let schema = observed.schema.as_ref().filter(|schema| is_owned(schema));
        let Some(schema) = schema else {
            let err = OperatorError::NotOwned {
                name: desired.name.clone(),
            };
            warn!(error = %err, "Refusing to touch remote resource");
            return Ok(rejected(desired, previous, err));
        };

        if previous.is_unacknowledged_create() {
            info!("Adopting resource created by an unacknowledged create");
            return Ok(PassOutcome {
                status: ReconciliationStatus::succeeded(&desired.name, Operation::Create),
                finalizer: FinalizerChange::Ensure,
                message: format!(
                    "adopted {} {} after unacknowledged create",
                    desired.kind.label(),
                    desired.name
                ),
            });
        }

        match self.update(desired, previous, &observed, schema).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(error = %err, "Update rejected");
                Ok(rejected(desired, previous, err))
            }
        }
    }

    /// Clean up after the desired-state object was deleted
    ///
    /// Remote failures are logged and never block the finalizer removal.
    #[instrument(skip_all, fields(resource = %target.name, kind = target.label))]
    pub async fn finalize(
        &self,
        target: &DeletionTarget,
        previous: &ReconciliationStatus,
        lister: &dyn DesiredStateLister,
    ) -> PassOutcome {
        let message = match self.drop_remote(target, previous, lister).await {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "Failed to delete remote resource");
                format!("can't delete {} {}: {err}", target.label, target.name)
            }
        };
        info!(message = %message, "Finalized");

        PassOutcome {
            status: previous.clone(),
            finalizer: FinalizerChange::Remove,
            message,
        }
    }

    async fn observe(&self, name: &str) -> Result<Option<ObservedState>> {
        if !self.client.exists(name).await? {
            return Ok(None);
        }
        match self.client.get_settings_and_schema(name).await {
            Ok(observed) => Ok(Some(observed)),
            Err(EsError::NotFound) => {
                debug!("Resource vanished between existence check and fetch");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, desired: &DesiredSpec) -> PassOutcome {
        let label = desired.kind.label();
        let result = match payload(desired) {
            Ok(payload) => {
                record_mutation(label, "create");
                self.client
                    .create(&desired.name, &payload)
                    .await
                    .map_err(OperatorError::from)
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                info!("Created remote resource");
                PassOutcome {
                    status: ReconciliationStatus::succeeded(&desired.name, Operation::Create),
                    finalizer: FinalizerChange::Ensure,
                    message: format!("successfully created ES {label} {}", desired.name),
                }
            }
            Err(err) => {
                warn!(error = %err, "Create rejected");
                PassOutcome {
                    message: format!("can't create ES {label} {}: {err}", desired.name),
                    status: ReconciliationStatus::failed(&desired.name, Operation::Create, err),
                    finalizer: FinalizerChange::Unchanged,
                }
            }
        }
    }

    async fn update(
        &self,
        desired: &DesiredSpec,
        previous: &ReconciliationStatus,
        observed: &ObservedState,
        observed_schema: &Value,
    ) -> Result<PassOutcome> {
        let label = desired.kind.label();

        if let (Some(want), Some(have)) = (desired.kind.template(), observed.template.as_ref()) {
            if want.differs_from(have) {
                info!("Template definition drifted, replacing template");
                record_mutation(label, "create");
                self.client.create(&desired.name, &payload(desired)?).await?;
                return Ok(updated(desired));
            }
        }

        let settings_changed = diff_settings(
            &desired.settings,
            &observed.settings,
            desired.kind.enforces_immutability(),
        )?;

        let annotated = annotate(&desired.schema)?;
        let schema_changed = diff_schema(
            &ConfigTree::from_document(&annotated)?,
            &ConfigTree::from_document(observed_schema)?,
        );

        if !settings_changed && !schema_changed {
            debug!("Remote resource matches desired state");
            let status = if previous.acknowledged && previous.latest_error.is_empty() {
                previous.clone()
            } else {
                ReconciliationStatus::succeeded(
                    &desired.name,
                    previous.operation.unwrap_or(Operation::Update),
                )
            };
            return Ok(PassOutcome {
                status,
                finalizer: FinalizerChange::Ensure,
                message: format!("no changes on {label} named {}", desired.name),
            });
        }

        if settings_changed {
            let settings = if desired.kind.enforces_immutability() {
                strip_static_settings(&desired.settings)
            } else {
                desired.settings.clone()
            };
            info!("Updating settings");
            record_mutation(label, "update_settings");
            self.client
                .update_settings(&desired.name, &settings)
                .await?;
        }

        if schema_changed {
            info!("Updating schema");
            record_mutation(label, "update_schema");
            self.client.update_schema(&desired.name, &annotated).await?;
        }

        Ok(updated(desired))
    }

    async fn drop_remote(
        &self,
        target: &DeletionTarget,
        previous: &ReconciliationStatus,
        lister: &dyn DesiredStateLister,
    ) -> Result<String> {
        let label = target.label;
        let name = &target.name;

        if !target.drop_on_delete {
            return Ok(format!("keeping ES {label} {name}: drop_on_delete is not set"));
        }
        if !previous.acknowledged {
            return Ok(format!(
                "keeping ES {label} {name}: it was never acknowledged"
            ));
        }
        if lister.sibling_names().await?.iter().any(|other| other == name) {
            return Ok(format!(
                "keeping ES {label} {name}: another object still declares it"
            ));
        }

        let observed = match self.client.get_settings_and_schema(name).await {
            Ok(observed) => observed,
            Err(EsError::NotFound) => return Ok(format!("ES {label} {name} is already gone")),
            Err(e) => return Err(e.into()),
        };
        if !observed.schema.as_ref().is_some_and(is_owned) {
            return Err(OperatorError::NotOwned { name: name.clone() });
        }

        record_mutation(label, "delete");
        self.client.delete(name).await?;
        Ok(format!("successfully deleted ES {label} {name}"))
    }
}

fn payload(desired: &DesiredSpec) -> Result<ResourcePayload> {
    Ok(ResourcePayload {
        settings: desired.settings.clone(),
        schema: annotate(&desired.schema)?,
        template: desired.kind.template().cloned(),
    })
}

fn updated(desired: &DesiredSpec) -> PassOutcome {
    PassOutcome {
        status: ReconciliationStatus::succeeded(&desired.name, Operation::Update),
        finalizer: FinalizerChange::Ensure,
        message: format!(
            "successfully updated ES {} {}",
            desired.kind.label(),
            desired.name
        ),
    }
}

fn rejected(
    desired: &DesiredSpec,
    previous: &ReconciliationStatus,
    err: OperatorError,
) -> PassOutcome {
    PassOutcome {
        message: err.to_string(),
        status: ReconciliationStatus::failed(&desired.name, previous.failure_operation(), err),
        finalizer: FinalizerChange::Unchanged,
    }
}

fn record_mutation(label: &str, operation: &'static str) {
    metrics::counter!(
        format!("esobj_{label}_remote_mutations_total"),
        "operation" => operation
    )
    .increment(1);
}
