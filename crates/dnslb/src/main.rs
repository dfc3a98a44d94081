use clap::Parser;
use dnslb_controller::{ControllerConfig, KubeClient, ServiceController, Watches};
use dnslb_core::NODE_ADDRESS_ANNOTATION;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "dnslb",
    about = "Publishes node addresses as LoadBalancer service ingress"
)]
struct Cli {
    /// Forced resync interval in seconds (0 disables)
    #[arg(long, env = "DNSLB_SYNC", default_value_t = 0)]
    sync: u64,
    /// Number of reconciles allowed to run at once
    #[arg(long, default_value_t = 4)]
    workers: u16,
    /// Deadline for one reconcile, in seconds
    #[arg(long, default_value_t = 30)]
    reconcile_timeout: u64,
    /// Pause before a failed reconcile is retried, in seconds
    #[arg(long, default_value_t = 5)]
    retry_delay: u64,
    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout),
            retry_delay: Duration::from_secs(self.retry_delay),
            ..ControllerConfig::with_sync_seconds(self.sync)
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(
        sync = cli.sync,
        annotation = NODE_ADDRESS_ANNOTATION,
        "starting"
    );

    // Kubeconfig when one is present, in-cluster service account otherwise
    let client = kube::Client::try_default()
        .await
        .map_err(|e| miette::miette!("Failed to load cluster configuration: {}", e))?;
    info!(namespace = client.default_namespace(), "Cluster configuration loaded");

    let watches = Watches::from_client(&client);
    let cluster = Arc::new(KubeClient::new(client, watches.stores()));
    let controller = ServiceController::new(cluster, cli.controller_config())?;

    let token = CancellationToken::new();
    let controller_token = token.clone();
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run(watches, controller_token).await {
            error!("Service controller error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    let shutdown_timeout = Duration::from_secs(5);
    if tokio::time::timeout(shutdown_timeout, controller_handle)
        .await
        .is_err()
    {
        error!("Service controller did not stop within {:?}", shutdown_timeout);
    }

    info!("Shutdown complete");

    Ok(())
}
