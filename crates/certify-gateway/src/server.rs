//! Accept loop shared by every listening port.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::app_state::AppState;

/// Accept connections until the shutdown token fires, one task per connection.
///
/// In-flight connection tasks are not cancelled; they end on EOF or I/O error.
pub async fn accept_loop<F, Fut>(name: &'static str, listener: TcpListener, state: AppState, handler: F)
where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let shutdown = state.shutdown();
    let local = listener.local_addr().ok();
    tracing::info!(server = name, listen = ?local, "listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(server = name, "stopped accepting");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        state.metrics().connections.inc(&[("server", name)]);
                        tracing::info!(server = name, %peer, "connection established");
                        tokio::spawn(handler(stream, peer));
                    }
                    Err(e) => {
                        tracing::warn!(server = name, error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

/// Cancel `token` on SIGINT or SIGTERM (ctrl-c elsewhere).
pub async fn signal_handler(token: tokio_util::sync::CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).inspect_err(|error| {
            tracing::error!(?error, "failed to register a SIGTERM handler");
        })?;
        let mut sigint = signal(SignalKind::interrupt()).inspect_err(|error| {
            tracing::error!(?error, "failed to register a SIGINT handler");
        })?;

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
            _ = sigint.recv() => tracing::info!("SIGINT received, shutting down"),
            _ = token.cancelled() => return Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("ctrl-c received, shutting down");
            }
            _ = token.cancelled() => return Ok(()),
        }
    }

    token.cancel();
    Ok(())
}
