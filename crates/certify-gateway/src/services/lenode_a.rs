//! Low-end COTS devices (variant A): the enrolment itself runs in an external
//! backend. This daemon replays the claim to it and then splices the device
//! connection through until either side closes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use certify_core::error::{CertifyError, Reply, Result};
use certify_core::protocol::bootstrap::{encode_plain, BootstrapCode};

use crate::config::LowEndAConfig;
use crate::dispatch::{BootstrapFlow, FlowCtx};
use crate::transport::{send_reply, BoxedStream};

/// Takes over a `LowEndA` connection once its claim is decoded.
#[async_trait]
pub trait LowEndBootstrap: Send + Sync {
    /// `Err` only when the handover could not start; the device then gets KO.
    async fn take_over(&self, ctx: &FlowCtx, device: &mut BoxedStream) -> Result<bool>;
}

/// Forwards the device to a TCP enrolment backend.
pub struct LowEndBackend {
    addr: String,
}

impl LowEndBackend {
    pub fn new(cfg: &LowEndAConfig) -> Self {
        Self {
            addr: cfg.backend.clone(),
        }
    }
}

#[async_trait]
impl LowEndBootstrap for LowEndBackend {
    async fn take_over(&self, ctx: &FlowCtx, device: &mut BoxedStream) -> Result<bool> {
        let fail = |what: &str, e: std::io::Error| {
            CertifyError::Backend(format!("low-end backend {} {what}: {e}", self.addr))
        };

        let mut backend = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| fail("connect", e))?;
        let claim = encode_plain(BootstrapCode::LowEndA, &ctx.request.mud_url)?;
        backend.write_all(&claim).await.map_err(|e| fail("send", e))?;

        match tokio::io::copy_bidirectional(device, &mut backend).await {
            Ok((to_backend, to_device)) => {
                tracing::info!(peer = %ctx.peer, to_backend, to_device, "low-end session closed");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(peer = %ctx.peer, error = %e, "low-end session broke off");
                Ok(false)
            }
        }
    }
}

/// Flow for `LowEndA`. Owns the connection from the claim on.
pub struct LowEndAFlow {
    backend: Arc<dyn LowEndBootstrap>,
}

impl LowEndAFlow {
    pub fn new(backend: Arc<dyn LowEndBootstrap>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl BootstrapFlow for LowEndAFlow {
    fn code(&self) -> BootstrapCode {
        BootstrapCode::LowEndA
    }

    async fn run(&self, ctx: FlowCtx, mut stream: BoxedStream) -> Result<bool> {
        match self.backend.take_over(&ctx, &mut stream).await {
            Ok(ok) => Ok(ok),
            Err(e) => {
                tracing::warn!(peer = %ctx.peer, error = %e, "low-end handover failed");
                send_reply(&mut stream, Reply::Ko).await?;
                Ok(false)
            }
        }
    }
}
