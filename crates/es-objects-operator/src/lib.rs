//! # Elasticsearch Objects Operator
//!
//! Kubernetes operator that keeps Elasticsearch indices and legacy index
//! templates in line with `ElasticSearchIndex` and `ElasticSearchTemplate`
//! custom resources.
//!
//! ## Features
//!
//! - **Create and update**: missing resources are created, dynamic settings
//!   and mappings of existing ones are updated in place
//! - **Static settings**: changing a setting fixed at index creation is
//!   reported as an error and never sent to the cluster
//! - **Ownership**: every mapping the operator writes carries
//!   `_meta.managed-by`; resources without it are never modified or deleted
//! - **Safe deletion**: with `drop_on_delete`, the remote resource is removed
//!   once no other object declares the same name
//! - **Observability**: Prometheus metrics per controller
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use es_objects_operator::prelude::*;
//! use kube::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::try_default().await?;
//!     let config = OperatorConfig::new("http://elasticsearch:9200");
//!     config.validate()?;
//!
//!     tokio::try_join!(
//!         run_index_controller(client.clone(), config.clone()),
//!         run_template_controller(client, config),
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The reconciliation engine does not depend on Kubernetes. A pass takes a
//! [`model::DesiredSpec`] and the previous [`model::ReconciliationStatus`],
//! reads the remote resource through [`es_client::ResourceClient`] and
//! returns a [`reconciler::PassOutcome`]. The [`controller`] module wires
//! passes to kube-rs watches and persists their outcome.
//!
//! ## Modules
//!
//! - [`tree`] - configuration trees, leaf paths and value normalization
//! - [`diff`] - settings and schema comparison, static settings
//! - [`ownership`] - ownership marker in schema documents
//! - [`model`] - desired, observed and status types
//! - [`es_client`] - Elasticsearch REST adapters
//! - [`reconciler`] - reconciliation state machine
//! - [`crd`] - Custom Resource Definition types with validation
//! - [`controller`] - kube-rs controllers
//! - [`config`] - operator configuration
//! - [`error`] - error types
//!
//! ## Custom Resource Definitions
//!
//! ```yaml
//! apiVersion: xo.90poe.io/v1alpha1
//! kind: ElasticSearchIndex
//! metadata:
//!   name: logs
//! spec:
//!   name: logs-2024
//!   drop_on_delete: true
//!   settings:
//!     number_of_shards: 3
//!     number_of_replicas: 1
//!   mappings: |
//!     {"properties": {"message": {"type": "text"}}}
//! ```

pub mod config;
pub mod controller;
pub mod crd;
pub mod diff;
pub mod error;
pub mod es_client;
pub mod model;
pub mod ownership;
pub mod reconciler;
pub mod tree;

pub use config::OperatorConfig;
pub use error::{OperatorError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::OperatorConfig;
    pub use crate::controller::{run_index_controller, run_template_controller};
    pub use crate::crd::{
        ElasticSearchIndex, ElasticSearchIndexSpec, ElasticSearchTemplate,
        ElasticSearchTemplateSpec, IndexSettings,
    };
    pub use crate::error::{OperatorError, Result};
    pub use crate::es_client::{EsError, IndexApi, ResourceClient, TemplateApi};
    pub use crate::model::{DeletionTarget, DesiredSpec, Operation, ReconciliationStatus};
    pub use crate::reconciler::{FinalizerChange, PassOutcome, Reconciler};
}
