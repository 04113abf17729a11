//! NVIDIA driver operator - reconciles NVIDIADriver resources

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use nvidia_driver_operator::cluster_info::ClusterInfo;
use nvidia_driver_operator::config::ControllerConfig;
use nvidia_driver_operator::controller::{build_controller, Reconciler};
use nvidia_driver_operator::crd::{ClusterPolicy, NVIDIADriver};
use nvidia_driver_operator::events::KubeEventPublisher;
use nvidia_driver_operator::retry::{retry_with_backoff, RetryConfig};
use nvidia_driver_operator::state::DriverDaemonSetState;
use nvidia_driver_operator::store::KubeStore;
use nvidia_driver_operator::telemetry::init_logging;
use nvidia_driver_operator::CONTROLLER_NAME;

/// NVIDIA driver operator - drives NVIDIADriver resources to their desired state
#[derive(Parser, Debug)]
#[command(name = "nvidia-driver-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: ControllerConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the NVIDIADriver controller (default mode)
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [NVIDIADriver::crd(), ClusterPolicy::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_logging(cli.config.log_format)?;
    cli.config.validate()?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let cluster_info = retry_with_backoff(
        &RetryConfig::with_max_attempts(5),
        "discover_cluster_info",
        || ClusterInfo::discover(&client),
    )
    .await?;
    tracing::info!(
        kubernetes_version = %cluster_info.kubernetes_version,
        gpu_nodes = cluster_info.gpu_node_count,
        container_runtime = cluster_info.container_runtime().unwrap_or("unknown"),
        "Collected cluster info"
    );

    let store = Arc::new(KubeStore::new(client.clone()));
    let state = Arc::new(DriverDaemonSetState::new(
        client.clone(),
        config.operator_namespace.clone(),
    ));
    let events = Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME));

    let reconciler = Reconciler::new(store, state, Arc::new(cluster_info))
        .with_events(events)
        .with_not_ready_delay(config.not_ready_delay());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    tracing::info!(
        namespace = %config.operator_namespace,
        "Running NVIDIADriver operator"
    );
    build_controller(
        client,
        Arc::new(reconciler),
        config.retry_config(),
        config.watch_timeout(),
        cancel,
    )
    .await;

    tracing::info!("Shutting down");
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM
async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Received shutdown signal");
    token.cancel();
}
