use async_trait::async_trait;
use std::sync::Arc;

use certify_core::error::Result;
use certify_core::protocol::bootstrap::BootstrapCode;

use crate::dispatch::{BootstrapFlow, FlowCtx};
use crate::lenode::{self, LeNodeSession};
use crate::obs::CertifyMetrics;
use crate::transport::BoxedStream;

/// `LowEndB` (RISC-V le-node) reached through the dispatcher.
///
/// The dispatcher already consumed the MUD claim, so the session starts at
/// the challenge.
pub struct LowEndBFlow {
    key: Vec<u8>,
    max_payload: usize,
    metrics: Arc<CertifyMetrics>,
}

impl LowEndBFlow {
    pub fn new(key: Vec<u8>, max_payload: usize, metrics: Arc<CertifyMetrics>) -> Self {
        Self {
            key,
            max_payload,
            metrics,
        }
    }
}

#[async_trait]
impl BootstrapFlow for LowEndBFlow {
    fn code(&self) -> BootstrapCode {
        BootstrapCode::LowEndB
    }

    async fn run(&self, ctx: FlowCtx, stream: BoxedStream) -> Result<bool> {
        tracing::info!(peer = %ctx.peer, mud_url = %ctx.request.mud_url, "le-node claim via dispatcher");
        let mut session = LeNodeSession::new(stream, self.key.clone()).with_max_payload(self.max_payload);
        Ok(lenode::run_after_claim(&mut session, &self.metrics).await)
    }
}
