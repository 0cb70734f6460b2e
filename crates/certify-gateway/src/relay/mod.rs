//! Board ↔ AAA ↔ ATT relay proxy.
//!
//! No envelope on this path: the first byte of every frame is its type.

pub mod attestation;
pub mod backend;
pub mod proxy;
pub mod reconf;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use certify_core::error::{CertifyError, Result};

use crate::app_state::AppState;
use crate::config::RelaySection;
use crate::obs::CertifyMetrics;
use crate::server;

pub use backend::BackendClient;
pub use session::{AttestationClock, RelaySession};

/// Everything a board session needs, shared by all sessions.
pub struct RelayContext {
    pub aaa: BackendClient,
    pub att: BackendClient,
    pub reconf_listen: SocketAddr,
    pub attestation_interval: Duration,
    pub max_frame_bytes: usize,
    pub metrics: Arc<CertifyMetrics>,
    pub shutdown: CancellationToken,
}

impl RelayContext {
    pub fn from_config(
        cfg: &RelaySection,
        metrics: Arc<CertifyMetrics>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let reconf_listen: SocketAddr = cfg.reconf_listen.parse().map_err(|e| {
            CertifyError::Config(format!("relay.reconf_listen must be a valid SocketAddr: {e}"))
        })?;

        Ok(Self {
            aaa: BackendClient::new("aaa", cfg.aaa_addr.clone(), cfg.max_frame_bytes),
            att: BackendClient::new("att", cfg.att_addr.clone(), cfg.max_frame_bytes),
            reconf_listen,
            attestation_interval: Duration::from_millis(cfg.attestation_interval_ms),
            max_frame_bytes: cfg.max_frame_bytes,
            metrics,
            shutdown,
        })
    }
}

/// Accept loop for the board port.
pub async fn serve(listener: TcpListener, state: AppState) {
    let relay = state.relay();
    server::accept_loop("relay", listener, state, move |stream, peer| {
        let relay = Arc::clone(&relay);
        async move {
            match proxy::run_board(Box::new(stream), peer, relay).await {
                Ok(()) => tracing::info!(%peer, "board connection closed"),
                Err(e) => tracing::warn!(%peer, error = %e, "board connection failed"),
            }
        }
    })
    .await;
}
