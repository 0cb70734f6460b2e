//! Board read loop while the device is bootstrapping.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use certify_core::error::{Reply, Result};
use certify_core::protocol::relay::{is_hello, BackendReply, BoardFrame};

use crate::relay::session::RelaySession;
use crate::relay::{attestation, reconf, RelayContext};
use crate::transport::{read_frame, BoxedStream};

/// Serve one board until it disconnects.
///
/// After a reconfiguration ACK the session moves to the attestation handler
/// for the rest of the connection.
pub async fn run_board(stream: BoxedStream, peer: SocketAddr, relay: Arc<RelayContext>) -> Result<()> {
    let (mut reader, writer) = tokio::io::split(stream);
    let mut session = RelaySession::new(Arc::new(Mutex::new(writer)));

    while let Some(frame) = read_frame(&mut reader, relay.max_frame_bytes).await? {
        tracing::debug!(%peer, bytes = frame.len(), frame = %hex::encode(&frame), "from board");

        let hello = is_hello(&frame);
        if hello {
            session.send(&frame).await?;
            tracing::info!(%peer, "echoed hello");
        }

        let Some(kind) = BoardFrame::classify(&frame) else {
            continue;
        };

        match kind {
            BoardFrame::MudClaim => {
                session
                    .forward(&relay.aaa, kind.as_str(), &frame, BackendReply::Challenge, &relay.metrics)
                    .await?;
            }
            BoardFrame::SignatureRandom => {
                let enrolled = session
                    .forward(&relay.aaa, kind.as_str(), &frame, BackendReply::Verdict, &relay.metrics)
                    .await?;
                if enrolled && !session.has_reconf_listener() {
                    start_reconf_listener(&mut session, &relay).await;
                }
            }
            BoardFrame::ReconfAck => {
                relay.metrics.relay_forwards.inc(&[("leg", "aaa"), ("kind", kind.as_str())]);
                if let Err(e) = relay.aaa.send_only(&frame).await {
                    tracing::warn!(%peer, error = %e, "reconfiguration ACK not delivered");
                    relay.metrics.nacks.inc(&[("reason", e.kind())]);
                    session.send(Reply::Ko.as_bytes()).await?;
                    continue;
                }
                tracing::info!(%peer, "reconfiguration ACK forwarded, entering attestation");
                return attestation::run(&mut reader, &mut session, &relay).await;
            }
            BoardFrame::Unknown(_) if hello => {}
            BoardFrame::Unknown(t) => {
                tracing::warn!(%peer, msg_type = t, "unknown message type from board");
            }
        }
    }

    Ok(())
}

async fn start_reconf_listener(session: &mut RelaySession, relay: &RelayContext) {
    match reconf::start(
        relay.reconf_listen,
        session.board(),
        relay.max_frame_bytes,
        Arc::clone(&relay.metrics),
        relay.shutdown.clone(),
    )
    .await
    {
        Ok(handle) => session.set_reconf_listener(handle),
        Err(e) => tracing::warn!(error = %e, "failed to start reconfiguration listener"),
    }
}
