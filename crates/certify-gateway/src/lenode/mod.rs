//! RISC-V le-node procedures and their standalone server.

pub mod session;

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::app_state::AppState;
use crate::obs::CertifyMetrics;
use crate::server;
use crate::transport::DeviceStream;

pub use session::{AuthPolicy, LeNodeSession, DEFAULT_MAX_PAYLOAD_BYTES};

/// Tampered frame length: at least one full envelope header.
pub const TAMPER_PROBE_LEN: usize = 48;

fn record(metrics: &CertifyMetrics, procedure: &str, ok: bool) -> bool {
    metrics.handshake(procedure, ok);
    tracing::info!(procedure, ok, "le-node procedure finished");
    ok
}

/// Reconfiguration then attestation, switching to mandatory tags once the
/// device has acknowledged the policy.
async fn run_after_bootstrap<S: DeviceStream>(
    session: &mut LeNodeSession<S>,
    metrics: &CertifyMetrics,
) -> bool {
    let ok = session.reconf_enable_auth().await;
    if !record(metrics, "reconf_enable_auth", ok) {
        return false;
    }
    session.set_policy(AuthPolicy::Required);

    let ok = session.remote_attestation().await;
    record(metrics, "remote_attestation", ok)
}

/// Bootstrap, ReconfEnableAuth, RemoteAttestation; stops at the first failure.
pub async fn run_procedures<S: DeviceStream>(
    session: &mut LeNodeSession<S>,
    metrics: &CertifyMetrics,
) -> bool {
    let ok = session.bootstrap().await;
    if !record(metrics, "bootstrap", ok) {
        return false;
    }
    run_after_bootstrap(session, metrics).await
}

/// Same sequence for a device whose MUD claim was already consumed.
pub async fn run_after_claim<S: DeviceStream>(
    session: &mut LeNodeSession<S>,
    metrics: &CertifyMetrics,
) -> bool {
    let ok = session.authenticate_claim().await;
    if !record(metrics, "bootstrap", ok) {
        return false;
    }
    run_after_bootstrap(session, metrics).await
}

async fn handle<S: DeviceStream>(stream: S, peer: SocketAddr, state: AppState) {
    let mut session = LeNodeSession::new(stream, state.lenode_key().to_vec())
        .with_max_payload(state.cfg().lenode.max_payload_bytes);
    let ok = run_procedures(&mut session, state.metrics()).await;
    tracing::info!(%peer, ok, "le-node session done");

    if ok && state.cfg().lenode.tamper_probe {
        match session.send_tamper_probe(TAMPER_PROBE_LEN).await {
            Ok(()) => tracing::info!(%peer, "sent tamper probe"),
            Err(e) => tracing::warn!(%peer, error = %e, "tamper probe failed"),
        }
    }
}

/// Accept le-nodes until shutdown; each connection runs the full sequence.
pub async fn serve(listener: TcpListener, state: AppState) {
    let st = state.clone();
    server::accept_loop("lenode", listener, state, move |stream, peer| {
        handle(stream, peer, st.clone())
    })
    .await;
}
