//! Elasticsearch Objects Operator
//!
//! Watches ElasticSearchIndex and ElasticSearchTemplate resources and keeps
//! the matching Elasticsearch objects in sync.

use anyhow::{Context, Result};
use clap::Parser;
use es_objects_operator::config::{
    OperatorConfig, DEFAULT_ERROR_REQUEUE_SECONDS, DEFAULT_MAX_CONCURRENT_RECONCILES,
    DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_REQUEUE_SECONDS,
};
use es_objects_operator::controller::{run_index_controller, run_template_controller};
use es_objects_operator::crd;
use kube::Client;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Elasticsearch Objects Operator
#[derive(Parser, Debug)]
#[command(name = "es-objects-operator")]
#[command(about = "Kubernetes operator for Elasticsearch indices and index templates")]
#[command(version)]
struct Args {
    /// Elasticsearch base URL
    #[arg(long, env = "ES_URL", default_value = "")]
    es_url: String,

    /// Maximum number of reconciliations running at once, per resource kind
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = DEFAULT_MAX_CONCURRENT_RECONCILES)]
    max_concurrent_reconciles: u16,

    /// Namespace to watch (empty for cluster-wide)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    namespace: String,

    /// Seconds between passes over an unchanged resource
    #[arg(long, env = "REQUEUE_INTERVAL_SECS", default_value_t = DEFAULT_REQUEUE_SECONDS)]
    requeue_interval_secs: u64,

    /// Seconds before retrying a failed pass
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = DEFAULT_ERROR_REQUEUE_SECONDS)]
    error_requeue_secs: u64,

    /// Timeout of a single Elasticsearch request in seconds
    #[arg(long, env = "ES_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECONDS)]
    es_request_timeout_secs: u64,

    /// Metrics server address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Health probe address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Print CRD YAML and exit
    #[arg(long)]
    print_crd: bool,
}

impl Args {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            es_url: self.es_url.clone(),
            max_concurrent_reconciles: self.max_concurrent_reconciles,
            namespace: if self.namespace.is_empty() {
                None
            } else {
                Some(self.namespace.clone())
            },
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            error_requeue_interval: Duration::from_secs(self.error_requeue_secs),
            request_timeout: Duration::from_secs(self.es_request_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        println!("{}", crd::crds_yaml()?);
        return Ok(());
    }

    init_logging(&args)?;

    let config = args.operator_config();
    config.validate().context("Invalid operator configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        es_url = %config.es_url,
        namespace = config.namespace.as_deref().unwrap_or("all"),
        "Starting Elasticsearch Objects Operator"
    );

    let metrics_addr = args.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_addr).await {
            tracing::error!(error = %e, "Metrics server failed");
        }
    });

    let health_addr = args.health_addr;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_addr).await {
            tracing::error!(error = %e, "Health server failed");
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    tokio::try_join!(
        run_index_controller(client.clone(), config.clone()),
        run_template_controller(client, config),
    )
    .context("Controller failed")?;

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(args: &Args) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Start the Prometheus metrics server
async fn start_metrics_server(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    info!(address = %addr, "Starting metrics server");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    std::future::pending::<()>().await;

    Ok(())
}

/// Start the health probe server
async fn start_health_server(addr: SocketAddr) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    info!(address = %addr, "Starting health server");

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind health server")?;

    loop {
        let (mut socket, _) = listener.accept().await?;

        tokio::spawn(async move {
            let mut buf = [0; 1024];
            if socket.read(&mut buf).await.is_ok() {
                let response = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK";
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
    }
}
