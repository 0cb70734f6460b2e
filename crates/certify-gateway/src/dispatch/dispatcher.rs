use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use certify_core::error::{CertifyError, Reply, Result};
use certify_core::protocol::bootstrap::{decode_bootstrap, BootstrapCode, BootstrapRequest};

use crate::obs::CertifyMetrics;
use crate::transport::{read_frame, send_reply, BoxedStream};

/// What a flow learns about the connection it takes over.
#[derive(Debug, Clone)]
pub struct FlowCtx {
    pub peer: SocketAddr,
    pub request: BootstrapRequest,
}

/// Device-class bootstrap procedure. Owns the stream once delegated to.
#[async_trait]
pub trait BootstrapFlow: Send + Sync {
    fn code(&self) -> BootstrapCode;
    /// `Ok(true)` when the device ended up enrolled.
    async fn run(&self, ctx: FlowCtx, stream: BoxedStream) -> Result<bool>;
}

/// How a dispatcher connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Peer closed before any claim was delegated.
    Closed,
    /// A flow took the connection over.
    Delegated { code: BootstrapCode, success: bool },
}

/// Registry of bootstrap flows keyed by bootstrap code.
pub struct Dispatcher {
    flows: DashMap<BootstrapCode, Arc<dyn BootstrapFlow>>,
    max_frame_bytes: usize,
    metrics: Arc<CertifyMetrics>,
}

impl Dispatcher {
    pub fn new(max_frame_bytes: usize, metrics: Arc<CertifyMetrics>) -> Self {
        Self {
            flows: DashMap::new(),
            max_frame_bytes,
            metrics,
        }
    }

    pub fn register(&self, flow: Arc<dyn BootstrapFlow>) {
        self.flows.insert(flow.code(), flow);
    }

    pub fn registered_codes(&self) -> Vec<BootstrapCode> {
        self.flows.iter().map(|e| *e.key()).collect()
    }

    fn flow(&self, code: BootstrapCode) -> Option<Arc<dyn BootstrapFlow>> {
        self.flows.get(&code).map(|e| e.value().clone())
    }

    async fn nack(&self, stream: &mut BoxedStream, peer: SocketAddr, reason: &str) -> Result<()> {
        self.metrics.nacks.inc(&[("reason", reason)]);
        tracing::info!(%peer, reason, "returned KO");
        send_reply(stream, Reply::Ko).await
    }

    /// Serve one connection: await a claim, NACK what cannot be handled, and
    /// hand the stream to the matching flow. Never resumes after delegating.
    ///
    /// Only stream-level I/O failures surface as `Err`.
    pub async fn serve_connection(&self, peer: SocketAddr, mut stream: BoxedStream) -> Result<DispatchOutcome> {
        loop {
            let Some(frame) = read_frame(&mut stream, self.max_frame_bytes).await? else {
                return Ok(DispatchOutcome::Closed);
            };
            tracing::debug!(%peer, bytes = frame.len(), frame = %hex::encode(&frame), "bootstrap frame");

            let request = match decode_bootstrap(&frame) {
                Ok(r) => r,
                Err(e) => match e.reply() {
                    Some(_) => {
                        tracing::debug!(%peer, error = %e, "undecodable claim");
                        self.nack(&mut stream, peer, e.kind()).await?;
                        continue;
                    }
                    None => return Err(e),
                },
            };

            let Some(flow) = self.flow(request.code) else {
                tracing::warn!(%peer, code = request.code.as_str(), "no flow registered for code");
                self.nack(&mut stream, peer, "unregistered_code").await?;
                continue;
            };

            let code = request.code;
            tracing::info!(
                %peer,
                code = code.as_str(),
                mud_url = %request.mud_url,
                "delegating bootstrap"
            );

            let success = match flow.run(FlowCtx { peer, request }, stream).await {
                Ok(ok) => ok,
                Err(e) => {
                    log_flow_error(peer, code, &e);
                    false
                }
            };
            self.metrics.handshake(code.as_str(), success);
            return Ok(DispatchOutcome::Delegated { code, success });
        }
    }
}

fn log_flow_error(peer: SocketAddr, code: BootstrapCode, e: &CertifyError) {
    tracing::warn!(%peer, code = code.as_str(), kind = e.kind(), error = %e, "bootstrap flow failed");
}
