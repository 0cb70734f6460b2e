//! Trusted Application executable calls.

use std::ffi::OsString;

use async_trait::async_trait;
use tokio::process::Command;

use certify_core::error::{CertifyError, Result};
use certify_core::protocol::ta::{self, ReconfigurationRequest};

#[async_trait]
pub trait TrustedApp: Send + Sync {
    /// Decrypt one received frame.
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
    /// Apply a reconfiguration command.
    async fn reconfigure(&self, req: &ReconfigurationRequest) -> Result<()>;
}

#[cfg(unix)]
fn raw_arg(bytes: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(bytes).to_os_string()
}

#[cfg(not(unix))]
fn raw_arg(bytes: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(bytes).into_owned())
}

/// `security_api_interface {decrypt|reconfigure} ...`
pub struct SecurityApiInterface {
    program: String,
}

impl SecurityApiInterface {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn call(&self, args: Vec<OsString>) -> Result<Vec<u8>> {
        let out = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| CertifyError::Backend(format!("spawn {} failed: {e}", self.program)))?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        if !out.status.success() {
            return Err(CertifyError::Backend(format!(
                "{} exited with {:?}: {}",
                self.program,
                out.status.code(),
                stdout.trim()
            )));
        }
        tracing::debug!(program = %self.program, stdout = %stdout.trim(), "trusted app output");
        Ok(out.stdout)
    }
}

#[async_trait]
impl TrustedApp for SecurityApiInterface {
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let escaped = ta::escape_for_decrypt(ciphertext);
        let len = escaped.len().to_string();
        let stdout = self
            .call(vec!["decrypt".into(), raw_arg(&escaped), len.into()])
            .await?;
        ta::decrypted_payload(&stdout)
    }

    async fn reconfigure(&self, req: &ReconfigurationRequest) -> Result<()> {
        let shifted = ta::shift_up(&req.data)?;
        let len = shifted.len().to_string();
        self.call(vec![
            "reconfigure".into(),
            raw_arg(&[req.opcode]),
            raw_arg(&shifted),
            len.into(),
        ])
        .await?;
        tracing::info!(opcode = req.opcode, bytes = req.data.len(), "reconfiguration applied");
        Ok(())
    }
}
