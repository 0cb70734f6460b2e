//! One-shot TCP legs to the AAA and ATT servers.
//!
//! Every request opens a fresh connection: write the frame, read one reply of
//! at most `max_frame_bytes`, close.

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use certify_core::error::{CertifyError, Result};

use crate::transport::read_frame;

#[derive(Debug, Clone)]
pub struct BackendClient {
    leg: &'static str,
    addr: String,
    max_frame_bytes: usize,
}

impl BackendClient {
    pub fn new(leg: &'static str, addr: impl Into<String>, max_frame_bytes: usize) -> Self {
        Self {
            leg,
            addr: addr.into(),
            max_frame_bytes,
        }
    }

    pub fn leg(&self) -> &'static str {
        self.leg
    }

    fn fail(&self, what: &str, e: impl std::fmt::Display) -> CertifyError {
        CertifyError::Backend(format!("{} {} {what}: {e}", self.leg, self.addr))
    }

    async fn connect_and_send(&self, frame: &[u8]) -> Result<TcpStream> {
        let mut conn = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| self.fail("connect", e))?;
        conn.write_all(frame).await.map_err(|e| self.fail("send", e))?;
        tracing::debug!(leg = self.leg, bytes = frame.len(), frame = %hex::encode(frame), "sent to backend");
        Ok(conn)
    }

    /// Send `frame` and return the reply (empty if the server closed without one).
    pub async fn exchange(&self, frame: &[u8]) -> Result<Bytes> {
        let mut conn = self.connect_and_send(frame).await?;
        let reply = read_frame(&mut conn, self.max_frame_bytes)
            .await
            .map_err(|e| self.fail("recv", e))?
            .unwrap_or_default();
        tracing::debug!(leg = self.leg, bytes = reply.len(), reply = %hex::encode(&reply), "backend reply");
        Ok(reply)
    }

    /// Send `frame` and close without waiting for a reply.
    pub async fn send_only(&self, frame: &[u8]) -> Result<()> {
        let mut conn = self.connect_and_send(frame).await?;
        conn.shutdown().await.map_err(|e| self.fail("close", e))?;
        Ok(())
    }
}
