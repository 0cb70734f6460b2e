//! Device-side Enforcement & Reconfiguration Agent.
//!
//! Receives reconfiguration frames from the domain, optionally decrypts them
//! through the Trusted Application, and applies them. Every frame gets OK or KO.

pub mod ta;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use certify_core::error::{Reply, Result};
use certify_core::protocol::ta::decode_reconfiguration;

use crate::app_state::AppState;
use crate::obs::CertifyMetrics;
use crate::server;
use crate::transport::{read_frame, send_reply, DeviceStream};

pub use ta::{SecurityApiInterface, TrustedApp};

/// Largest frame read in one receive.
pub const MAX_FRAME_BYTES: usize = 2048;

pub struct EraAgent {
    ta: Arc<dyn TrustedApp>,
    decrypt: bool,
    metrics: Arc<CertifyMetrics>,
}

impl EraAgent {
    pub fn new(ta: Arc<dyn TrustedApp>, decrypt: bool, metrics: Arc<CertifyMetrics>) -> Self {
        Self { ta, decrypt, metrics }
    }

    async fn apply(&self, frame: &[u8]) -> Result<()> {
        let plain = if self.decrypt {
            self.ta.decrypt(frame).await?
        } else {
            frame.to_vec()
        };
        let req = decode_reconfiguration(&plain)?;
        tracing::info!(opcode = req.opcode, bytes = req.data.len(), "reconfiguration request");
        self.ta.reconfigure(&req).await
    }

    /// Answer every frame on `stream` until the peer closes.
    pub async fn serve_connection<S: DeviceStream>(&self, peer: SocketAddr, mut stream: S) -> Result<()> {
        while let Some(frame) = read_frame(&mut stream, MAX_FRAME_BYTES).await? {
            tracing::debug!(%peer, bytes = frame.len(), frame = %hex::encode(&frame), "era frame");

            let reply = match self.apply(&frame).await {
                Ok(()) => Reply::Ok,
                Err(e) => {
                    tracing::warn!(%peer, kind = e.kind(), error = %e, "reconfiguration rejected");
                    self.metrics.nacks.inc(&[("reason", e.kind())]);
                    Reply::Ko
                }
            };
            self.metrics.handshake("reconfiguration", reply == Reply::Ok);
            send_reply(&mut stream, reply).await?;
        }
        Ok(())
    }
}

/// Accept loop for the agent port.
pub async fn serve(listener: TcpListener, state: AppState) {
    let agent = state.era();
    server::accept_loop("era", listener, state, move |stream, peer| {
        let agent = Arc::clone(&agent);
        async move {
            if let Err(e) = agent.serve_connection(peer, stream).await {
                tracing::warn!(%peer, error = %e, "era connection failed");
            }
        }
    })
    .await;
}
