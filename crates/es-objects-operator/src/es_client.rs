//! Elasticsearch client
//!
//! The reconciliation engine talks to the remote system through the
//! [`ResourceClient`] trait. Two reqwest-backed adapters implement it: one for
//! indices and one for legacy index templates. Both share a single
//! [`EsHttp`] connection with a request timeout; neither retries internally,
//! retries are the controller's business.

use crate::model::{ObservedState, ResourcePayload, TemplateExtras};
use crate::tree::ConfigTree;
use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default timeout for a single request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by the remote API
#[derive(Error, Debug)]
pub enum EsError {
    /// Resource does not exist
    #[error("es object not found")]
    NotFound,

    /// Request never produced a response
    #[error("elasticsearch request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("elasticsearch returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Mutating call answered with `acknowledged: false`
    #[error("{operation} was not acknowledged")]
    NotAcknowledged { operation: String },

    /// Response body could not be interpreted
    #[error("can't decode elasticsearch response: {0}")]
    Decode(String),
}

pub type EsResult<T> = std::result::Result<T, EsError>;

impl EsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EsError::NotFound)
    }

    /// Failures worth retrying without changing the request
    pub fn is_transient(&self) -> bool {
        match self {
            EsError::Transport(_) => true,
            EsError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Operations the reconciliation engine needs on one kind of remote resource
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn exists(&self, name: &str) -> EsResult<bool>;

    /// Fetch settings and schema; a missing resource is [`EsError::NotFound`]
    async fn get_settings_and_schema(&self, name: &str) -> EsResult<ObservedState>;

    async fn create(&self, name: &str, payload: &ResourcePayload) -> EsResult<()>;

    async fn update_settings(&self, name: &str, settings: &ConfigTree) -> EsResult<()>;

    async fn update_schema(&self, name: &str, schema: &Value) -> EsResult<()>;

    async fn delete(&self, name: &str) -> EsResult<()>;
}

#[derive(Debug, Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

/// Shared HTTP connection to one cluster
#[derive(Debug, Clone)]
pub struct EsHttp {
    client: reqwest::Client,
    base_url: String,
}

impl EsHttp {
    pub fn new(base_url: &str, timeout: Duration) -> EsResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> EsResult<Response> {
        debug!(method = %method, path = %path, "Sending request");
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        check_status(response).await
    }

    async fn head(&self, path: &str) -> EsResult<bool> {
        match self.send(Method::HEAD, path, None).await {
            Ok(_) => Ok(true),
            Err(EsError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_json(&self, path: &str) -> EsResult<Value> {
        let response = self.send(Method::GET, path, None).await?;
        decode(response).await
    }

    async fn acknowledged(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        operation: &str,
    ) -> EsResult<()> {
        let response = self.send(method, path, body).await?;
        let ack: Acknowledged = decode(response).await?;
        if ack.acknowledged {
            Ok(())
        } else {
            Err(EsError::NotAcknowledged {
                operation: operation.to_string(),
            })
        }
    }
}

async fn check_status(response: Response) -> EsResult<Response> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(EsError::NotFound);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EsError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> EsResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| EsError::Decode(e.to_string()))
}

/// Pick the entry for `name` out of a `{name: {...}}` response
///
/// The server keys the entry by the concrete name, which differs from the
/// requested one when the request went through an alias. An alias over
/// several indices has no single entry to pick.
fn named_entry(body: Value, name: &str) -> EsResult<Value> {
    let Value::Object(mut entries) = body else {
        return Err(EsError::Decode(format!(
            "expected an object keyed by '{name}'"
        )));
    };
    if let Some(entry) = entries.remove(name) {
        return Ok(entry);
    }
    if entries.len() > 1 {
        let names: Vec<&str> = entries.keys().map(String::as_str).collect();
        return Err(EsError::Decode(format!(
            "'{name}' resolves to {} resources: {}",
            names.len(),
            names.join(", ")
        )));
    }
    entries
        .into_iter()
        .next()
        .map(|(_, entry)| entry)
        .ok_or(EsError::NotFound)
}

fn observed_settings(entry: &Value) -> EsResult<ConfigTree> {
    match entry.get("settings") {
        None | Some(Value::Null) => Ok(ConfigTree::new()),
        Some(settings) => {
            ConfigTree::from_json(settings.clone()).map_err(|e| EsError::Decode(e.to_string()))
        }
    }
}

fn observed_template(entry: &Value) -> TemplateExtras {
    let index_patterns = entry
        .get("index_patterns")
        .and_then(Value::as_array)
        .map(|patterns| {
            patterns
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let aliases = entry
        .get("aliases")
        .and_then(Value::as_object)
        .map(|aliases| {
            aliases
                .iter()
                .map(|(name, body)| (name.clone(), body.clone()))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    TemplateExtras {
        index_patterns,
        aliases,
        version: entry.get("version").and_then(Value::as_i64),
    }
}

/// Index adapter: `/{name}`, `/{name}/_settings`, `/{name}/_mapping`
#[derive(Debug, Clone)]
pub struct IndexApi {
    http: EsHttp,
}

impl IndexApi {
    pub fn new(http: EsHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ResourceClient for IndexApi {
    async fn exists(&self, name: &str) -> EsResult<bool> {
        self.http.head(name).await
    }

    async fn get_settings_and_schema(&self, name: &str) -> EsResult<ObservedState> {
        let entry = named_entry(self.http.get_json(name).await?, name)?;
        Ok(ObservedState {
            settings: observed_settings(&entry)?,
            schema: entry.get("mappings").cloned(),
            template: None,
        })
    }

    async fn create(&self, name: &str, payload: &ResourcePayload) -> EsResult<()> {
        let body = json!({
            "settings": payload.settings.to_json(),
            "mappings": payload.schema,
        });
        self.http
            .acknowledged(Method::PUT, name, Some(&body), &format!("create index {name}"))
            .await
    }

    async fn update_settings(&self, name: &str, settings: &ConfigTree) -> EsResult<()> {
        self.http
            .acknowledged(
                Method::PUT,
                &format!("{name}/_settings"),
                Some(&settings.to_json()),
                &format!("update settings of index {name}"),
            )
            .await
    }

    async fn update_schema(&self, name: &str, schema: &Value) -> EsResult<()> {
        self.http
            .acknowledged(
                Method::PUT,
                &format!("{name}/_mapping"),
                Some(schema),
                &format!("update mappings of index {name}"),
            )
            .await
    }

    async fn delete(&self, name: &str) -> EsResult<()> {
        self.http
            .acknowledged(Method::DELETE, name, None, &format!("delete index {name}"))
            .await
    }
}

/// Legacy index template adapter: `/_template/{name}`
///
/// Templates have no partial update endpoints, so settings and schema updates
/// fetch the stored template, replace one section and put it back whole.
#[derive(Debug, Clone)]
pub struct TemplateApi {
    http: EsHttp,
}

impl TemplateApi {
    pub fn new(http: EsHttp) -> Self {
        Self { http }
    }

    fn path(name: &str) -> String {
        format!("_template/{name}")
    }

    async fn fetch(&self, name: &str) -> EsResult<Map<String, Value>> {
        match named_entry(self.http.get_json(&Self::path(name)).await?, name)? {
            Value::Object(template) => Ok(template),
            _ => Err(EsError::Decode(format!("template {name} is not an object"))),
        }
    }

    async fn replace_section(&self, name: &str, section: &str, value: Value) -> EsResult<()> {
        let mut template = self.fetch(name).await?;
        template.insert(section.to_string(), value);
        self.http
            .acknowledged(
                Method::PUT,
                &Self::path(name),
                Some(&Value::Object(template)),
                &format!("update {section} of template {name}"),
            )
            .await
    }
}

fn template_body(payload: &ResourcePayload) -> Value {
    let mut body = Map::new();
    let extras = payload.template.clone().unwrap_or_default();
    body.insert("index_patterns".to_string(), json!(extras.index_patterns));
    body.insert("settings".to_string(), payload.settings.to_json());
    body.insert("mappings".to_string(), payload.schema.clone());
    if !extras.aliases.is_empty() {
        body.insert("aliases".to_string(), json!(extras.aliases));
    }
    if let Some(version) = extras.version {
        body.insert("version".to_string(), json!(version));
    }
    Value::Object(body)
}

#[async_trait]
impl ResourceClient for TemplateApi {
    async fn exists(&self, name: &str) -> EsResult<bool> {
        self.http.head(&Self::path(name)).await
    }

    async fn get_settings_and_schema(&self, name: &str) -> EsResult<ObservedState> {
        let entry = Value::Object(self.fetch(name).await?);
        Ok(ObservedState {
            settings: observed_settings(&entry)?,
            schema: entry.get("mappings").cloned(),
            template: Some(observed_template(&entry)),
        })
    }

    async fn create(&self, name: &str, payload: &ResourcePayload) -> EsResult<()> {
        self.http
            .acknowledged(
                Method::PUT,
                &Self::path(name),
                Some(&template_body(payload)),
                &format!("put template {name}"),
            )
            .await
    }

    async fn update_settings(&self, name: &str, settings: &ConfigTree) -> EsResult<()> {
        self.replace_section(name, "settings", settings.to_json())
            .await
    }

    async fn update_schema(&self, name: &str, schema: &Value) -> EsResult<()> {
        self.replace_section(name, "mappings", schema.clone()).await
    }

    async fn delete(&self, name: &str) -> EsResult<()> {
        self.http
            .acknowledged(
                Method::DELETE,
                &Self::path(name),
                None,
                &format!("delete template {name}"),
            )
            .await
    }
}
