use std::path::Path;
use std::path::PathBuf;

use raftcell::Error;
use raftcell::NetworkError;
use raftcell::NodeBuilder;
use raftcell::NodeConfig;
use raftcell::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    // Optional config file as the only argument; env vars still win.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let node_config = NodeConfig::load(config_path.as_deref())?;

    let _guard = init_observability(node_config.cluster.node_id, &node_config.cluster.log_dir);

    let (graceful_tx, graceful_rx) = watch::channel(());

    let node = NodeBuilder::from_config(node_config, graceful_rx)
        .build()
        .await?
        .ready()?;

    info!("node {} started, waiting for shutdown signal", node.node_id);

    tokio::spawn(async move {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = node.run().await {
        error!("node stopped: {:?}", e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::Fatal(format!("failed to install SIGINT handler: {}", e)))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Fatal(format!("failed to install SIGTERM handler: {}", e)))?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        NetworkError::SignalSendFailed(format!("failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability(
    node_id: u32,
    log_dir: &Path,
) -> WorkerGuard {
    let file_appender =
        tracing_appender::rolling::daily(log_dir, format!("raftcell-{}.log", node_id));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    guard
}
