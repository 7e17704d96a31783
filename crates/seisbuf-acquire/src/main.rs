//! seisbuf-acquire binary entry point

use std::path::PathBuf;

use clap::Parser;
use seisbuf_metadata::ChannelCatalog;
use seisbuf_store::TraceStore;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seisbuf_acquire::metrics::AcquireMetrics;
use seisbuf_acquire::server::{run_server, ServerState};
use seisbuf_acquire::{open_source, Acquisition, Config};

#[derive(Parser, Debug)]
#[command(name = "seisbuf-acquire")]
#[command(about = "Reassemble sensor frames into per-channel traces")]
struct Args {
    /// Path to acquisition configuration file
    #[arg(short, long, env = "SEISBUF_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config).map_err(|e| {
        error!(error = %e, "Failed to load config");
        e
    })?;
    let catalog = ChannelCatalog::load(&config.catalog).map_err(|e| {
        error!(error = %e, path = ?config.catalog, "Failed to load station catalog");
        e
    })?;
    let channels = catalog.channels()?;

    info!(
        source = config.source.kind(),
        stations = catalog.stations.len(),
        channels = channels.len(),
        storage = ?config.storage.as_ref().map(|s| &s.path),
        "Starting acquisition"
    );

    let metrics = AcquireMetrics::new(config.source.kind());
    let mut acquisition = Acquisition::new(&channels, config.source.decoder(), metrics);
    if let Some(storage) = &config.storage {
        acquisition = acquisition.with_store(TraceStore::create(&storage.path)?);
    }

    if let Some(server) = &config.server {
        let state = ServerState::new(config.source.kind(), acquisition.heartbeat());
        let addr = server.listen;
        info!(%addr, "Starting health server");
        tokio::spawn(async move {
            if let Err(e) = run_server(addr, state).await {
                error!(error = %e, "Health server failed");
            }
        });
    }

    let mut source = open_source(&config.source, acquisition.registry()).await?;

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received, shutting down gracefully"),
                _ = sigint.recv() => info!("SIGINT received, shutting down gracefully"),
            }
            shutdown.cancel();
        });
    }

    let joined = tokio::spawn(async move { acquisition.run(source.as_mut(), &shutdown).await }).await;

    match joined {
        Ok(Ok(summary)) => {
            info!(cycles = summary.cycles, "Acquisition stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Acquisition failed");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Acquisition task panicked");
            Err(e.into())
        }
    }
}
