//! CERTIFY daemon.
//!
//! Usage: `certify-gateway [config.yaml]` (default `certify.yaml`).

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use certify_core::error::Result;
use certify_gateway::{app_state::AppState, config, dispatch, era, lenode, relay, server};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "certify.yaml".into());
    let cfg = config::load_from_file(&path)?;
    tracing::info!(config = %path, "config loaded");

    let state = AppState::new(cfg)?;
    let cfg = state.cfg();

    let mut servers = JoinSet::new();
    if cfg.bootstrap.enabled {
        let listener = TcpListener::bind(cfg.bootstrap.listen_addr()?).await?;
        servers.spawn(dispatch::serve(listener, state.clone()));
    }
    if cfg.lenode.enabled {
        let listener = TcpListener::bind(cfg.lenode.listen_addr()?).await?;
        servers.spawn(lenode::serve(listener, state.clone()));
    }
    if cfg.relay.enabled {
        let listener = TcpListener::bind(cfg.relay.listen_addr()?).await?;
        servers.spawn(relay::serve(listener, state.clone()));
    }
    if cfg.era.enabled {
        let listener = TcpListener::bind(cfg.era.listen_addr()?).await?;
        servers.spawn(era::serve(listener, state.clone()));
    }

    if servers.is_empty() {
        tracing::warn!("every server is disabled, nothing to do");
        return Ok(());
    }

    let shutdown = state.shutdown();
    tokio::spawn(async move {
        if let Err(e) = server::signal_handler(shutdown.clone()).await {
            tracing::error!(error = %e, "signal handling unavailable, shutting down");
            shutdown.cancel();
        }
    });

    while servers.join_next().await.is_some() {}

    tracing::info!(metrics = %state.metrics().render(), "shutdown complete");
    Ok(())
}
