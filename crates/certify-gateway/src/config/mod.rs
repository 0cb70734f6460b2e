//! Daemon config loader (strict parsing).

pub mod schema;

use std::fs;

use certify_core::error::{CertifyError, Result};

pub use schema::{
    AaManagerConfig, BootstrapSection, CertifyConfig, EraSection, LeNodeSection, LowEndAConfig,
    RelaySection,
};

pub fn load_from_file(path: &str) -> Result<CertifyConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CertifyError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<CertifyConfig> {
    let cfg: CertifyConfig = serde_yaml::from_str(s)
        .map_err(|e| CertifyError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
