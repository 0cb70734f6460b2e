//! Per-board relay state.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use certify_core::error::{Reply, Result};
use certify_core::protocol::relay::BackendReply;

use crate::obs::CertifyMetrics;
use crate::relay::backend::BackendClient;
use crate::transport::BoxedStream;

/// Write side of the board socket, shared with the reconfiguration listener.
pub type BoardWriter = Arc<Mutex<WriteHalf<BoxedStream>>>;

/// Write one frame to the board under the writer lock.
pub async fn write_board(board: &BoardWriter, frame: &[u8]) -> Result<()> {
    let mut w = board.lock().await;
    w.write_all(frame).await?;
    w.flush().await?;
    Ok(())
}

/// Periodic ATT_D probe state. Disarmed until the first verdict after a
/// signature+random frame.
#[derive(Debug, Clone, Copy)]
pub struct AttestationClock {
    complete: bool,
    last_sent: Instant,
}

impl AttestationClock {
    pub fn new(session_start: Instant) -> Self {
        Self {
            complete: false,
            last_sent: session_start,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.complete
    }

    /// Mark attestation complete and a probe as just sent.
    pub fn arm(&mut self, now: Instant) {
        self.complete = true;
        self.last_sent = now;
    }

    pub fn sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// When the next probe is due, if armed.
    pub fn deadline(&self, interval: Duration) -> Option<Instant> {
        self.complete.then(|| self.last_sent + interval)
    }
}

pub struct RelaySession {
    board: BoardWriter,
    reconf_listener: Option<JoinHandle<()>>,
    pub clock: AttestationClock,
}

impl RelaySession {
    pub fn new(board: BoardWriter) -> Self {
        Self {
            board,
            reconf_listener: None,
            clock: AttestationClock::new(Instant::now()),
        }
    }

    pub fn board(&self) -> BoardWriter {
        Arc::clone(&self.board)
    }

    pub async fn send(&self, frame: &[u8]) -> Result<()> {
        write_board(&self.board, frame).await
    }

    pub fn has_reconf_listener(&self) -> bool {
        self.reconf_listener.is_some()
    }

    pub fn set_reconf_listener(&mut self, handle: JoinHandle<()>) {
        self.reconf_listener = Some(handle);
    }

    /// Relay `frame` to `backend` and forward the reply to the board iff it is
    /// of the `expected` kind. A backend failure answers KO to the board.
    ///
    /// Returns whether a reply was forwarded.
    pub async fn forward(
        &self,
        backend: &BackendClient,
        kind: &str,
        frame: &[u8],
        expected: BackendReply,
        metrics: &CertifyMetrics,
    ) -> Result<bool> {
        metrics.relay_forwards.inc(&[("leg", backend.leg()), ("kind", kind)]);

        let reply = match backend.exchange(frame).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(leg = backend.leg(), kind, error = %e, "backend unreachable");
                metrics.nacks.inc(&[("reason", e.kind())]);
                self.send(Reply::Ko.as_bytes()).await?;
                return Ok(false);
            }
        };

        let got = BackendReply::classify(&reply);
        if got != expected {
            tracing::info!(leg = backend.leg(), kind, reply = ?got, "backend reply not forwarded");
            return Ok(false);
        }

        self.send(&reply).await?;
        metrics.relay_forwards.inc(&[("leg", "board"), ("kind", kind)]);
        tracing::info!(leg = backend.leg(), kind, bytes = reply.len(), "forwarded backend reply to board");
        Ok(true)
    }
}

/// The push listener holds a clone of the board writer; it goes with the
/// board session so the socket closes and `reconf_listen` is free again.
impl Drop for RelaySession {
    fn drop(&mut self) {
        if let Some(listener) = self.reconf_listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_disarmed_until_armed() {
        let start = Instant::now();
        let mut clock = AttestationClock::new(start);
        let every = Duration::from_secs(10);
        assert!(!clock.is_armed());
        assert_eq!(clock.deadline(every), None);

        let later = start + Duration::from_secs(3);
        clock.arm(later);
        assert_eq!(clock.deadline(every), Some(later + every));

        clock.sent(later + every);
        assert_eq!(clock.deadline(every), Some(later + every + every));
    }
}
