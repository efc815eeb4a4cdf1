//! Kubernetes controllers
//!
//! One generic controller drives both custom resources. It converts the
//! object into a [`DesiredSpec`], runs a reconciliation pass and persists
//! the outcome: status through the status subresource, finalizer through a
//! metadata patch. The finalizer is handled here rather than with
//! `kube::runtime::finalizer` because it may only be added after a pass
//! succeeded.

use crate::config::OperatorConfig;
use crate::crd::{ElasticSearchIndex, ElasticSearchTemplate};
use crate::error::{OperatorError, Result};
use crate::es_client::{EsHttp, IndexApi, ResourceClient, TemplateApi};
use crate::model::{DeletionTarget, DesiredSpec, ReconciliationStatus};
use crate::reconciler::{DesiredStateLister, FinalizerChange, Reconciler};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Finalizer guarding ElasticSearchIndex objects
pub const INDEX_FINALIZER: &str = "finalizer.elasticsearchindex.90poe.io";

/// Finalizer guarding ElasticSearchTemplate objects
pub const TEMPLATE_FINALIZER: &str = "finalizer.elasticsearchtemplate.90poe.io";

/// A custom resource the operator reconciles into a remote resource
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    const FINALIZER: &'static str;

    /// Used in metric names and logs
    const KIND_LABEL: &'static str;

    /// Name of the remote resource
    fn external_name(&self) -> &str;

    fn drop_on_delete(&self) -> bool;

    fn to_desired(&self) -> Result<DesiredSpec>;

    fn reconciliation_status(&self) -> Option<&ReconciliationStatus>;

    /// Read from the object directly, never through `to_desired`
    fn deletion_target(&self) -> DeletionTarget {
        DeletionTarget::new(self.external_name(), Self::KIND_LABEL, self.drop_on_delete())
    }
}

impl ManagedResource for ElasticSearchIndex {
    const FINALIZER: &'static str = INDEX_FINALIZER;
    const KIND_LABEL: &'static str = "index";

    fn external_name(&self) -> &str {
        &self.spec.name
    }

    fn drop_on_delete(&self) -> bool {
        self.spec.drop_on_delete
    }

    fn to_desired(&self) -> Result<DesiredSpec> {
        self.spec.to_desired()
    }

    fn reconciliation_status(&self) -> Option<&ReconciliationStatus> {
        self.status.as_ref()
    }
}

impl ManagedResource for ElasticSearchTemplate {
    const FINALIZER: &'static str = TEMPLATE_FINALIZER;
    const KIND_LABEL: &'static str = "template";

    fn external_name(&self) -> &str {
        &self.spec.name
    }

    fn drop_on_delete(&self) -> bool {
        self.spec.drop_on_delete
    }

    fn to_desired(&self) -> Result<DesiredSpec> {
        self.spec.to_desired()
    }

    fn reconciliation_status(&self) -> Option<&ReconciliationStatus> {
        self.status.as_ref()
    }
}

/// Metrics for one controller
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Counter for reconciliation attempts
    pub reconciliations: metrics::Counter,
    /// Counter for reconciliation errors
    pub errors: metrics::Counter,
    /// Histogram for reconciliation duration
    pub duration: metrics::Histogram,
}

impl ControllerMetrics {
    pub fn new(kind: &str) -> Self {
        Self {
            reconciliations: metrics::counter!(format!("esobj_{kind}_reconciliations_total")),
            errors: metrics::counter!(format!("esobj_{kind}_reconciliation_errors_total")),
            duration: metrics::histogram!(format!(
                "esobj_{kind}_reconciliation_duration_seconds"
            )),
        }
    }
}

/// Context passed to every reconciliation
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub reconciler: Reconciler,
    pub config: OperatorConfig,
    pub metrics: ControllerMetrics,
}

/// Start the ElasticSearchIndex controller
pub async fn run_index_controller(client: Client, config: OperatorConfig) -> Result<()> {
    let http = EsHttp::new(&config.es_url, config.request_timeout)?;
    run_controller::<ElasticSearchIndex>(client, config, Arc::new(IndexApi::new(http))).await
}

/// Start the ElasticSearchTemplate controller
pub async fn run_template_controller(client: Client, config: OperatorConfig) -> Result<()> {
    let http = EsHttp::new(&config.es_url, config.request_timeout)?;
    run_controller::<ElasticSearchTemplate>(client, config, Arc::new(TemplateApi::new(http)))
        .await
}

async fn run_controller<K: ManagedResource>(
    client: Client,
    config: OperatorConfig,
    remote: Arc<dyn ResourceClient>,
) -> Result<()> {
    let api: Api<K> = match &config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    info!(
        kind = K::KIND_LABEL,
        namespace = config.namespace.as_deref().unwrap_or("all"),
        concurrency = config.max_concurrent_reconciles,
        "Starting controller"
    );

    let controller_config =
        controller::Config::default().concurrency(config.max_concurrent_reconciles);
    let ctx = Arc::new(Context {
        client,
        reconciler: Reconciler::new(remote),
        metrics: ControllerMetrics::new(K::KIND_LABEL),
        config,
    });

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(
                        name = obj.name,
                        namespace = obj.namespace,
                        ?action,
                        "Reconciliation completed"
                    );
                }
                Err(e) => {
                    error!(kind = K::KIND_LABEL, error = %e, "Reconciliation failed");
                }
            }
        })
        .await;

    Ok(())
}

/// Main reconciliation function
#[instrument(skip(obj, ctx), fields(kind = K::KIND_LABEL, name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile<K: ManagedResource>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    ctx.metrics.reconciliations.increment(1);

    let result = if obj.meta().deletion_timestamp.is_some() {
        cleanup(obj.as_ref(), &ctx).await
    } else {
        apply(obj.as_ref(), &ctx).await
    };

    ctx.metrics.duration.record(start.elapsed().as_secs_f64());
    if result.is_err() {
        ctx.metrics.errors.increment(1);
    }
    result
}

async fn apply<K: ManagedResource>(obj: &K, ctx: &Context) -> Result<Action> {
    let api = namespaced_api::<K>(obj, &ctx.client);
    let previous = obj.reconciliation_status().cloned().unwrap_or_default();

    let desired = match obj.to_desired() {
        Ok(desired) => desired,
        Err(err) => {
            warn!(
                error = %err,
                permanent = err.is_permanent(),
                "Spec can't be reconciled"
            );
            let status = ReconciliationStatus::failed(
                obj.external_name(),
                previous.failure_operation(),
                &err,
            );
            update_status(&api, obj, &previous, &status).await?;
            return Ok(Action::requeue(ctx.config.error_requeue_interval));
        }
    };

    let outcome = ctx.reconciler.reconcile(&desired, &previous).await?;

    persist_outcome(
        update_finalizer(&api, obj, outcome.finalizer),
        update_status(&api, obj, &previous, &outcome.status),
    )
    .await?;

    if outcome.is_failure() {
        warn!(message = %outcome.message, "Reconciliation pass failed");
        Ok(Action::requeue(ctx.config.error_requeue_interval))
    } else {
        info!(message = %outcome.message, "Reconciliation pass complete");
        Ok(Action::requeue(ctx.config.requeue_interval))
    }
}

async fn cleanup<K: ManagedResource>(obj: &K, ctx: &Context) -> Result<Action> {
    if !obj.finalizers().iter().any(|f| f == K::FINALIZER) {
        return Ok(Action::await_change());
    }

    let api = namespaced_api::<K>(obj, &ctx.client);
    let previous = obj.reconciliation_status().cloned().unwrap_or_default();

    let lister = SiblingLister::<K> {
        api: Api::all(ctx.client.clone()),
        uid: obj.uid(),
    };
    let outcome = ctx
        .reconciler
        .finalize(&obj.deletion_target(), &previous, &lister)
        .await;
    info!(message = %outcome.message, "Cleanup complete");

    update_finalizer(&api, obj, outcome.finalizer).await?;
    Ok(Action::await_change())
}

fn namespaced_api<K: ManagedResource>(obj: &K, client: &Client) -> Api<K> {
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    Api::namespaced(client.clone(), &namespace)
}

/// Patch the status subresource when the pass changed it
async fn update_status<K: ManagedResource>(
    api: &Api<K>,
    obj: &K,
    previous: &ReconciliationStatus,
    status: &ReconciliationStatus,
) -> Result<()> {
    if obj.reconciliation_status().is_some() && status == previous {
        return Ok(());
    }

    debug!(acknowledged = status.acknowledged, "Updating status");

    let patch = serde_json::json!({
        "status": status
    });
    api.patch_status(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(OperatorError::from)?;

    Ok(())
}

/// Run the finalizer patch, then the status patch even if the first failed
///
/// The finalizer patch carries `resourceVersion` and may conflict; the
/// status of a pass that already mutated the remote resource must not be
/// lost with it.
async fn persist_outcome(
    finalizer: impl Future<Output = Result<()>>,
    status: impl Future<Output = Result<()>>,
) -> Result<()> {
    let finalizer = finalizer.await;
    if let Err(err) = &finalizer {
        warn!(error = %err, "Finalizer patch failed, still recording status");
    }
    status.await?;
    finalizer
}

/// Finalizer list after applying `change`, or `None` when nothing changes
fn finalizers_after(
    current: &[String],
    finalizer: &str,
    change: FinalizerChange,
) -> Option<Vec<String>> {
    let present = current.iter().any(|f| f == finalizer);
    match change {
        FinalizerChange::Ensure if !present => {
            let mut updated = current.to_vec();
            updated.push(finalizer.to_string());
            Some(updated)
        }
        FinalizerChange::Remove if present => Some(
            current
                .iter()
                .filter(|f| f.as_str() != finalizer)
                .cloned()
                .collect(),
        ),
        _ => None,
    }
}

async fn update_finalizer<K: ManagedResource>(
    api: &Api<K>,
    obj: &K,
    change: FinalizerChange,
) -> Result<()> {
    let Some(finalizers) = finalizers_after(obj.finalizers(), K::FINALIZER, change) else {
        return Ok(());
    };

    debug!(?change, "Updating finalizers");

    // resourceVersion makes the patch fail instead of clobbering a concurrent edit
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": obj.resource_version(),
        }
    });
    api.patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|e| OperatorError::FinalizerError(e.to_string()))?;

    Ok(())
}

/// Lists every other live object of the same kind, in all namespaces
struct SiblingLister<K: ManagedResource> {
    api: Api<K>,
    uid: Option<String>,
}

#[async_trait]
impl<K: ManagedResource> DesiredStateLister for SiblingLister<K> {
    async fn sibling_names(&self) -> Result<Vec<String>> {
        let objects = self.api.list(&ListParams::default()).await?;
        Ok(objects
            .items
            .iter()
            .filter(|o| o.uid() != self.uid && o.meta().deletion_timestamp.is_none())
            .map(|o| o.external_name().to_string())
            .collect())
    }
}

/// Error policy shared by both controllers
fn error_policy<K: ManagedResource>(obj: Arc<K>, error: &OperatorError, ctx: Arc<Context>) -> Action {
    warn!(
        kind = K::KIND_LABEL,
        name = %obj.name_any(),
        error = %error,
        retryable = error.is_retryable(),
        "Reconciliation error, will retry"
    );

    Action::requeue(ctx.config.error_requeue_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ElasticSearchIndexSpec, ElasticSearchTemplateSpec, IndexSettings};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn finalizers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_ensure_adds_missing_finalizer() {
        assert_eq!(
            finalizers_after(&[], INDEX_FINALIZER, FinalizerChange::Ensure),
            Some(finalizers(&[INDEX_FINALIZER]))
        );
        assert_eq!(
            finalizers_after(
                &finalizers(&["other", INDEX_FINALIZER]),
                INDEX_FINALIZER,
                FinalizerChange::Ensure
            ),
            None
        );
    }

    #[test]
    fn test_remove_keeps_foreign_finalizers() {
        assert_eq!(
            finalizers_after(
                &finalizers(&["other", TEMPLATE_FINALIZER]),
                TEMPLATE_FINALIZER,
                FinalizerChange::Remove
            ),
            Some(finalizers(&["other"]))
        );
        assert_eq!(
            finalizers_after(&finalizers(&["other"]), TEMPLATE_FINALIZER, FinalizerChange::Remove),
            None
        );
    }

    #[test]
    fn test_unchanged_never_patches() {
        assert_eq!(
            finalizers_after(&[], INDEX_FINALIZER, FinalizerChange::Unchanged),
            None
        );
    }

    #[test]
    fn test_managed_resource_impls() {
        let index = ElasticSearchIndex::new(
            "k8s-name",
            ElasticSearchIndexSpec {
                name: "remote-index".to_string(),
                drop_on_delete: false,
                settings: IndexSettings::default(),
                mappings: "{}".to_string(),
            },
        );
        assert_eq!(index.external_name(), "remote-index");
        assert!(index.reconciliation_status().is_none());
        assert_eq!(ElasticSearchIndex::FINALIZER, INDEX_FINALIZER);

        let template = ElasticSearchTemplate::new(
            "k8s-name",
            ElasticSearchTemplateSpec {
                name: "remote-template".to_string(),
                drop_on_delete: true,
                index_patterns: vec!["logs-*".to_string()],
                aliases: Default::default(),
                settings: IndexSettings::default(),
                mappings: "{}".to_string(),
                version: None,
            },
        );
        assert_eq!(template.external_name(), "remote-template");
        assert_eq!(ElasticSearchTemplate::KIND_LABEL, "template");
        assert!(!template.to_desired().unwrap().kind.enforces_immutability());
    }

    #[test]
    fn test_deletion_target_survives_unparseable_spec() {
        let index = ElasticSearchIndex::new(
            "k8s-name",
            ElasticSearchIndexSpec {
                name: "remote-index".to_string(),
                drop_on_delete: true,
                settings: IndexSettings::default(),
                mappings: "{not json".to_string(),
            },
        );

        assert!(index.to_desired().is_err());
        assert_eq!(
            index.deletion_target(),
            DeletionTarget::new("remote-index", "index", true)
        );
    }

    #[tokio::test]
    async fn test_status_is_recorded_when_finalizer_patch_fails() {
        let recorded = AtomicBool::new(false);

        let result = persist_outcome(
            async { Err::<(), _>(OperatorError::FinalizerError("conflict".to_string())) },
            async {
                recorded.store(true, Ordering::SeqCst);
                Ok::<(), OperatorError>(())
            },
        )
        .await;

        assert!(recorded.load(Ordering::SeqCst));
        assert!(matches!(result, Err(OperatorError::FinalizerError(_))));
    }

    #[tokio::test]
    async fn test_status_error_wins_over_finalizer_success() {
        let result = persist_outcome(async { Ok::<(), OperatorError>(()) }, async {
            Err::<(), _>(OperatorError::ReconcileFailed("status".to_string()))
        })
        .await;

        assert!(matches!(result, Err(OperatorError::ReconcileFailed(_))));
    }
}
