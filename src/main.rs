//! Volume Claim Operator
//!
//! Watches PersistentVolumeClaims carrying the ownership annotation, allocates
//! a backing volume for each one and registers a matching PersistentVolume.
//! Deleting the claim releases both again.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volume_claim_operator::{
    ClaimReconciler, ClusterStateRef, EventDispatcher, KubeClusterClient, OperatorConfig,
    OperatorMetrics, OpsServer, OpsState, RestClusterClient, VolumeDriverClient,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Volume Claim Operator - binds PersistentVolumeClaims to external volumes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "OPERATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Root that claim UIDs are appended to for volume host paths
    #[arg(long, env = "MOUNT_ROOT")]
    mount_root: Option<String>,

    /// Annotation key marking managed claims
    #[arg(long, env = "OWNERSHIP_KEY")]
    ownership_key: Option<String>,

    /// Annotation value marking managed claims
    #[arg(long, env = "OWNERSHIP_VALUE")]
    ownership_value: Option<String>,

    /// Write PersistentVolume records to this API server URL instead of
    /// through the in-cluster/kubeconfig client. Any --cluster-* flag
    /// selects direct access.
    #[arg(long, env = "CLUSTER_SERVER")]
    cluster_server: Option<String>,

    /// Bearer token file for the API server
    #[arg(long, env = "CLUSTER_TOKEN_FILE")]
    cluster_token_file: Option<PathBuf>,

    /// CA bundle for the API server
    #[arg(long, env = "CLUSTER_CA_FILE")]
    cluster_ca_file: Option<PathBuf>,

    /// Volume service URL
    #[arg(long, env = "BACKEND_ENDPOINT")]
    backend_endpoint: Option<String>,

    /// Only watch claims in this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Only watch claims matching this label selector
    #[arg(long, env = "LABEL_SELECTOR")]
    label_selector: Option<String>,

    /// Health and metrics bind address
    #[arg(long, env = "OPS_ADDR")]
    ops_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Load the configuration file, if any, and apply flag overrides
    fn operator_config(&self) -> anyhow::Result<OperatorConfig> {
        let mut config = match &self.config {
            Some(path) => OperatorConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => OperatorConfig::default(),
        };

        if let Some(mount_root) = &self.mount_root {
            config.reconciler.mount_root = mount_root.clone();
        }
        if let Some(key) = &self.ownership_key {
            config.reconciler.ownership.key = key.clone();
        }
        if let Some(value) = &self.ownership_value {
            config.reconciler.ownership.value = value.clone();
        }
        if let Some(server) = &self.cluster_server {
            config.cluster.get_or_insert_with(Default::default).server = server.clone();
        }
        if self.cluster_token_file.is_some() {
            config.cluster.get_or_insert_with(Default::default).token_file =
                self.cluster_token_file.clone();
        }
        if self.cluster_ca_file.is_some() {
            config.cluster.get_or_insert_with(Default::default).ca_file =
                self.cluster_ca_file.clone();
        }
        if let Some(endpoint) = &self.backend_endpoint {
            config.backend.endpoint = endpoint.clone();
        }
        if self.namespace.is_some() {
            config.dispatcher.namespace = self.namespace.clone();
        }
        if self.label_selector.is_some() {
            config.dispatcher.label_selector = self.label_selector.clone();
        }
        if let Some(addr) = self.ops_addr {
            config.ops.addr = addr;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    let config = args.operator_config()?;

    info!("Starting {}", volume_claim_operator::NAME);
    info!("  Version: {}", volume_claim_operator::VERSION);
    info!("  Mount root: {}", config.reconciler.mount_root);
    info!(
        "  Ownership: {}={}",
        config.reconciler.ownership.key, config.reconciler.ownership.value
    );
    info!("  Volume service: {}", config.backend.endpoint);

    let client = kube::Client::try_default()
        .await
        .context("connecting to Kubernetes")?;

    let metrics = OperatorMetrics::new().context("registering metrics")?;

    let backend = VolumeDriverClient::new(config.backend.clone())
        .context("building volume service client")?;
    let cluster: ClusterStateRef = match &config.cluster {
        Some(rest) => {
            info!("  Cluster API: {} (direct)", rest.server);
            Arc::new(RestClusterClient::new(rest.clone()).context("building cluster API client")?)
        }
        None => {
            info!("  Cluster API: shared kube client");
            Arc::new(KubeClusterClient::new(client.clone()))
        }
    };

    let reconciler = Arc::new(ClaimReconciler::new(
        config.reconciler.clone(),
        Arc::new(backend),
        cluster,
        metrics.clone(),
    ));
    let dispatcher = EventDispatcher::new(reconciler, config.dispatcher.clone(), metrics.clone());

    let shutdown = CancellationToken::new();

    // Start ops server
    let ops = OpsServer::new(
        config.ops.clone(),
        OpsState {
            metrics,
            ready: dispatcher.readiness(),
        },
    );
    let ops_shutdown = shutdown.clone();
    let ops_task = tokio::spawn(async move {
        if let Err(e) = ops.run(ops_shutdown).await {
            error!("Ops server error: {}", e);
        }
    });

    // Stop on Ctrl-C
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_shutdown.cancel();
    });

    let result = dispatcher.clone().run(client, shutdown.clone()).await;
    shutdown.cancel();

    // Let in-flight reconciliations finish both halves before exiting
    if dispatcher.shutdown().await {
        info!("All reconciliations finished");
    } else {
        warn!("Exiting with reconciliations still in flight");
    }
    let _ = ops_task.await;

    result.context("claim watch failed")?;
    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("kube=info".parse()?)
        .add_directive("tower=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
