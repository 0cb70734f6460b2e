//! Attestation phase of a relay session.
//!
//! Entered after the board acknowledged its reconfiguration. Signature+random
//! and attestation-log frames go to the ATT server; verdicts come back. Once
//! the first verdict for a signature+random frame is forwarded, an ATT_D
//! probe is sent at least every `attestation_interval`.

use tokio::io::AsyncRead;
use tokio::time::Instant;

use certify_core::error::Result;
use certify_core::protocol::relay::{AttestationFrame, BackendReply, ATT_DONE, ATT_START};

use crate::relay::session::RelaySession;
use crate::relay::RelayContext;
use crate::transport::read_frame;

async fn probe_due(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run on the board session task until the board disconnects.
pub async fn run<R>(reader: &mut R, session: &mut RelaySession, relay: &RelayContext) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    session.send(&ATT_START).await?;
    tracing::info!("sent ATT_S to board");

    loop {
        let deadline = session.clock.deadline(relay.attestation_interval);

        let frame = tokio::select! {
            read = read_frame(reader, relay.max_frame_bytes) => match read? {
                Some(f) => f,
                None => return Ok(()),
            },
            _ = probe_due(deadline) => {
                session.send(&ATT_DONE).await?;
                session.clock.sent(Instant::now());
                tracing::info!("sent periodic ATT_D to board");
                continue;
            }
        };
        tracing::debug!(bytes = frame.len(), frame = %hex::encode(&frame), "from board (attestation)");

        let Some(kind) = AttestationFrame::classify(&frame) else {
            continue;
        };

        match kind {
            AttestationFrame::SignatureRandom => {
                let forwarded = session
                    .forward(&relay.att, kind.as_str(), &frame, BackendReply::Verdict, &relay.metrics)
                    .await?;
                if forwarded {
                    session.send(&ATT_DONE).await?;
                    session.clock.arm(Instant::now());
                    tracing::info!("attestation complete, sent ATT_D");
                }
            }
            AttestationFrame::AttestationLog => {
                session
                    .forward(&relay.att, kind.as_str(), &frame, BackendReply::Verdict, &relay.metrics)
                    .await?;
            }
            AttestationFrame::Unknown(t) => {
                tracing::warn!(msg_type = t, "unknown attestation message type from board");
            }
        }
    }
}
