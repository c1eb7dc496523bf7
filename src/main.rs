use blob_upload_agent::config::{Cli, Config};
use blob_upload_agent::dispatch::TriggerDispatcher;
use blob_upload_agent::ditto::DittoClient;
use blob_upload_agent::error::Result;
use blob_upload_agent::upload::FileUploader;
use blob_upload_agent::identity;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blob_upload_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    const VERSION: &str = env!("CARGO_PKG_VERSION");
    tracing::info!(version = %VERSION, "BLOB Upload Agent starting");

    let config = Config::from_cli(Cli::parse())?;
    tracing::info!(
        broker = %config.broker,
        file = %config.file_path.display(),
        "Configuration loaded"
    );

    // Identity must be resolved before anything else can proceed.
    let device_identity = identity::resolve(&config).await?;

    // Main messaging session; the dedicated identity connection is already
    // torn down at this point.
    let (client, inbound) = DittoClient::connect(&config).await?;

    // A failed announce is fatal; a failed request leaves the agent waiting
    // for an interrupt, matching the one-shot nature of the run.
    client.announce_feature(&device_identity).await?;
    if let Err(e) = client.request_upload(&device_identity, config.blob_id()).await {
        tracing::warn!(error = %e, "failed to send request upload message");
    }

    let shutdown = CancellationToken::new();
    let dispatcher = TriggerDispatcher::new(
        device_identity,
        Arc::new(FileUploader::new()),
        shutdown.clone(),
    );
    let dispatch_task = tokio::spawn(dispatcher.run(inbound));

    // Block until the upload completed or the OS asked us to stop.
    tokio::select! {
        _ = shutdown.cancelled() => {
            tracing::info!("upload finished");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    dispatch_task.abort();
    client.close().await;

    tracing::info!("BLOB Upload Agent stopped");
    Ok(())
}
