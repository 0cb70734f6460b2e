//! Bootstrap dispatcher: classifies the first message of a connection and
//! delegates the connection to the flow registered for its bootstrap code.

pub mod dispatcher;

use tokio::net::TcpListener;

use crate::app_state::AppState;
use crate::server;

pub use dispatcher::{BootstrapFlow, DispatchOutcome, Dispatcher, FlowCtx};

/// Accept loop for the bootstrapping port.
pub async fn serve(listener: TcpListener, state: AppState) {
    let dispatcher = state.dispatcher();
    server::accept_loop("bootstrap", listener, state, move |stream, peer| {
        let dispatcher = dispatcher.clone();
        async move {
            match dispatcher.serve_connection(peer, Box::new(stream)).await {
                Ok(outcome) => tracing::info!(%peer, ?outcome, "bootstrap connection closed"),
                Err(e) => tracing::warn!(%peer, error = %e, "bootstrap connection failed"),
            }
        }
    })
    .await;
}
