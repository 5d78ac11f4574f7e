use anyhow::{Context, Result};
use clap::Parser;
use m8s::{
    api::server::start_server,
    client::ApiClient,
    config::{ApiServerConfig, Cli, Command, KubeletConfig},
    runtime::{DockerCli, Kubelet},
    Storage,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "m8s=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Apiserver(config) => run_apiserver(config).await,
        Command::Kubelet(config) => run_kubelet(config).await,
    }
}

async fn run_apiserver(config: ApiServerConfig) -> Result<()> {
    tracing::info!("Starting m8s API server");

    let storage = Storage::open(&config.state_file)
        .await
        .with_context(|| format!("failed to open state file {}", config.state_file.display()))?;
    tracing::info!("State store initialized: {}", storage.path().display());

    start_server(storage, config.listen, shutdown_signal()).await
}

async fn run_kubelet(config: KubeletConfig) -> Result<()> {
    tracing::info!(
        "Starting m8s kubelet (node {}, API server {}, engine {})",
        config.node_name,
        config.api_url,
        config.engine
    );

    let client = ApiClient::new(&config.api_url).context("failed to build API client")?;
    let kubelet = Kubelet::new(
        config.node_name.clone(),
        Arc::new(client),
        Arc::new(DockerCli::new(config.engine.clone())),
    )
    .with_sync_interval(config.sync_interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent = tokio::spawn(async move { kubelet.run(shutdown_rx).await });

    shutdown_signal().await;
    tracing::info!("Shutting down kubelet, waiting for the current pass to finish");
    let _ = shutdown_tx.send(true);
    agent.await.context("kubelet task failed")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
}
