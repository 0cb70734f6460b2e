//! High-end device bootstrap: acknowledge the claim, then run the native
//! key-derivation executable for the device.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use certify_core::error::{CertifyError, Reply, Result};
use certify_core::protocol::bootstrap::BootstrapCode;

use crate::config::AaManagerConfig;
use crate::dispatch::{BootstrapFlow, FlowCtx};
use crate::transport::{send_reply, BoxedStream};

/// Marker the executable prints when the EAP exchange completed.
pub const AUTH_FINISHED: &str = "Authentication finished!";

/// Arguments handed to the key-derivation executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationRequest {
    pub key_id: String,
    pub device_name: String,
    pub device_ip: String,
    pub mud_url: String,
}

/// Captured result of one derivation run.
#[derive(Debug, Clone, Default)]
pub struct DerivationReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl DerivationReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && self.stdout.contains(AUTH_FINISHED)
    }
}

#[async_trait]
pub trait KeyDerivation: Send + Sync {
    /// `Err` only when the executable could not be run at all.
    async fn derive(&self, req: &DerivationRequest) -> Result<DerivationReport>;
}

/// Runs `<program> <key_id> <device_name> <device_ip> <mud_url> <port_arg>`.
pub struct AaManager {
    program: String,
    port_arg: String,
}

impl AaManager {
    pub fn new(cfg: &AaManagerConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            port_arg: cfg.port_arg.clone(),
        }
    }
}

#[async_trait]
impl KeyDerivation for AaManager {
    async fn derive(&self, req: &DerivationRequest) -> Result<DerivationReport> {
        let out = Command::new(&self.program)
            .args([
                req.key_id.as_str(),
                req.device_name.as_str(),
                req.device_ip.as_str(),
                req.mud_url.as_str(),
                self.port_arg.as_str(),
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CertifyError::Backend(format!("spawn {} failed: {e}", self.program)))?;

        Ok(DerivationReport {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        })
    }
}

/// Flow for `HighEndPrimary` (PSK) and `HighEndSecondary` (MSK).
pub struct HighEndFlow {
    code: BootstrapCode,
    key_id: String,
    deriver: Arc<dyn KeyDerivation>,
    report_success: bool,
}

impl HighEndFlow {
    pub fn new(
        code: BootstrapCode,
        key_id: impl Into<String>,
        deriver: Arc<dyn KeyDerivation>,
        report_success: bool,
    ) -> Self {
        Self {
            code,
            key_id: key_id.into(),
            deriver,
            report_success,
        }
    }

    /// Final reply after a derivation. Without `report_success` the device
    /// always gets KO, success or not.
    fn final_reply(&self, succeeded: bool) -> Reply {
        if succeeded && self.report_success {
            Reply::Ok
        } else {
            Reply::Ko
        }
    }
}

#[async_trait]
impl BootstrapFlow for HighEndFlow {
    fn code(&self) -> BootstrapCode {
        self.code
    }

    async fn run(&self, ctx: FlowCtx, mut stream: BoxedStream) -> Result<bool> {
        send_reply(&mut stream, Reply::Ok).await?;

        let ip = ctx.peer.ip().to_string();
        let req = DerivationRequest {
            key_id: self.key_id.clone(),
            device_name: format!("high_end_device-{ip}"),
            device_ip: ip,
            mud_url: ctx.request.mud_url,
        };

        let report = match self.deriver.derive(&req).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(device = %req.device_name, error = %e, "key derivation did not run");
                send_reply(&mut stream, Reply::Ko).await?;
                return Ok(false);
            }
        };

        let succeeded = report.succeeded();
        if report.exit_code == Some(0) {
            tracing::info!(
                device = %req.device_name,
                succeeded,
                stdout = %report.stdout,
                "key derivation finished"
            );
        } else {
            tracing::warn!(
                device = %req.device_name,
                exit_code = ?report.exit_code,
                stdout = %report.stdout,
                stderr = %report.stderr,
                "key derivation failed"
            );
        }

        send_reply(&mut stream, self.final_reply(succeeded)).await?;
        Ok(succeeded)
    }
}
