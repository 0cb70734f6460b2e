//! Reconfiguration push listener.
//!
//! Bound once a board is enrolled. The AAA server connects and pushes
//! reconfiguration frames, which go to the board unmodified. A listener
//! failure never takes the board session down; the listener itself ends when
//! writing to the board fails, on shutdown, or when the board session ends.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use certify_core::error::Result;
use certify_core::protocol::relay::PushFrame;

use crate::obs::CertifyMetrics;
use crate::relay::session::{write_board, BoardWriter};
use crate::transport::read_frame;

/// Whether the board is still reachable after a push connection ended.
enum Pushed {
    BoardAlive,
    BoardGone,
}

/// Bind `addr` and spawn the listener. Binding errors are returned so the
/// caller can log them and keep relaying.
pub async fn start(
    addr: SocketAddr,
    board: BoardWriter,
    max_frame_bytes: usize,
    metrics: Arc<CertifyMetrics>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(listen = %addr, "reconfiguration listener started");
    Ok(tokio::spawn(run(listener, board, max_frame_bytes, metrics, shutdown)))
}

async fn run(
    listener: TcpListener,
    board: BoardWriter,
    max_frame_bytes: usize,
    metrics: Arc<CertifyMetrics>,
    shutdown: CancellationToken,
) {
    loop {
        let (conn, from) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "reconfiguration accept failed");
                    continue;
                }
            },
        };
        metrics.connections.inc(&[("server", "reconf")]);
        tracing::info!(%from, "reconfiguration connection established");

        match relay_pushes(conn, &board, max_frame_bytes, &metrics, &shutdown).await {
            Pushed::BoardAlive => tracing::info!(%from, "reconfiguration connection closed"),
            Pushed::BoardGone => break,
        }
    }
    tracing::info!("reconfiguration listener stopped");
}

async fn relay_pushes(
    mut conn: TcpStream,
    board: &BoardWriter,
    max_frame_bytes: usize,
    metrics: &CertifyMetrics,
    shutdown: &CancellationToken,
) -> Pushed {
    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => return Pushed::BoardAlive,
            read = read_frame(&mut conn, max_frame_bytes) => read,
        };
        let frame = match read {
            Ok(Some(f)) => f,
            Ok(None) => return Pushed::BoardAlive,
            Err(e) => {
                tracing::warn!(error = %e, "reconfiguration receive failed");
                return Pushed::BoardAlive;
            }
        };
        tracing::debug!(bytes = frame.len(), frame = %hex::encode(&frame), "pushed by AAA");

        match PushFrame::classify(&frame) {
            Some(PushFrame::Reconfiguration(t)) => {
                if let Err(e) = write_board(board, &frame).await {
                    tracing::warn!(error = %e, "board unreachable, stopping reconfiguration listener");
                    return Pushed::BoardGone;
                }
                metrics
                    .relay_forwards
                    .inc(&[("leg", "board"), ("kind", "reconfiguration")]);
                tracing::info!(msg_type = t, "forwarded reconfiguration to board");
            }
            Some(PushFrame::Unknown(t)) => {
                tracing::warn!(msg_type = t, "unknown message type from AAA");
            }
            None => {}
        }
    }
}
