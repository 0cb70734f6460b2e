use std::net::SocketAddr;

use serde::Deserialize;
use certify_core::error::{CertifyError, Result};

/// Key shared with the reference RISC-V le-node firmware.
const DEFAULT_LENODE_MSK: &str = "24390E18CB94309EDCE27D99514EC8F4338F2E0AA071D8A3703AC869A9888266";

fn bad(msg: impl Into<String>) -> CertifyError {
    CertifyError::Config(msg.into())
}

fn parse_addr(field: &str, v: &str) -> Result<SocketAddr> {
    v.parse()
        .map_err(|e| bad(format!("{field} must be a valid SocketAddr ({v}): {e}")))
}

fn check_frame_bytes(field: &str, v: usize) -> Result<()> {
    if !(64..=65536).contains(&v) {
        return Err(bad(format!("{field} must be between 64 and 65536")));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertifyConfig {
    pub version: u32,

    #[serde(default)]
    pub bootstrap: BootstrapSection,

    #[serde(default)]
    pub lenode: LeNodeSection,

    #[serde(default)]
    pub relay: RelaySection,

    #[serde(default)]
    pub era: EraSection,
}

impl CertifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(bad(format!("unsupported config version {}", self.version)));
        }

        self.bootstrap.validate()?;
        self.lenode.validate()?;
        self.relay.validate()?;
        self.era.validate()?;

        Ok(())
    }
}

/// Bootstrapping request manager (dispatcher port).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bootstrap_listen")]
    pub listen: String,

    /// Opaque key identifier for primary (PSK) derivation.
    #[serde(default = "default_psk_key")]
    pub psk_key: String,

    /// Opaque key identifier for secondary (MSK) derivation.
    #[serde(default = "default_msk_key")]
    pub msk_key: String,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default)]
    pub aa_manager: AaManagerConfig,

    #[serde(default)]
    pub low_end_a: LowEndAConfig,
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_bootstrap_listen(),
            psk_key: default_psk_key(),
            msk_key: default_msk_key(),
            max_frame_bytes: default_max_frame_bytes(),
            aa_manager: AaManagerConfig::default(),
            low_end_a: LowEndAConfig::default(),
        }
    }
}

impl BootstrapSection {
    pub fn validate(&self) -> Result<()> {
        parse_addr("bootstrap.listen", &self.listen)?;
        check_frame_bytes("bootstrap.max_frame_bytes", self.max_frame_bytes)?;
        if self.psk_key.is_empty() || self.msk_key.is_empty() {
            return Err(bad("bootstrap.psk_key and bootstrap.msk_key must not be empty"));
        }
        self.aa_manager.validate()?;
        parse_addr("bootstrap.low_end_a.backend", &self.low_end_a.backend)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_addr("bootstrap.listen", &self.listen)
    }
}

/// High-end key-derivation executable.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AaManagerConfig {
    #[serde(default = "default_aa_program")]
    pub program: String,

    /// Fixed trailing argument handed to the executable.
    #[serde(default = "default_aa_port_arg")]
    pub port_arg: String,

    /// Reply OK after a successful derivation. Off reproduces the deployed
    /// behaviour, which answers KO after every run.
    #[serde(default)]
    pub report_success: bool,
}

impl Default for AaManagerConfig {
    fn default() -> Self {
        Self {
            program: default_aa_program(),
            port_arg: default_aa_port_arg(),
            report_success: false,
        }
    }
}

impl AaManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.program.is_empty() {
            return Err(bad("bootstrap.aa_manager.program must not be empty"));
        }
        Ok(())
    }
}

/// Enrolment backend that takes over low-end COTS (variant A) devices.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LowEndAConfig {
    #[serde(default = "default_low_end_a_backend")]
    pub backend: String,
}

impl Default for LowEndAConfig {
    fn default() -> Self {
        Self {
            backend: default_low_end_a_backend(),
        }
    }
}

/// Standalone le-node server.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeNodeSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_lenode_listen")]
    pub listen: String,

    #[serde(default = "default_lenode_msk")]
    pub msk_hex: String,

    /// Envelopes declaring a longer payload are refused unread.
    #[serde(default = "default_lenode_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Send 48 random bytes after the procedures to trip the device lock.
    #[serde(default)]
    pub tamper_probe: bool,
}

impl Default for LeNodeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_lenode_listen(),
            msk_hex: default_lenode_msk(),
            max_payload_bytes: default_lenode_max_payload_bytes(),
            tamper_probe: false,
        }
    }
}

impl LeNodeSection {
    pub fn validate(&self) -> Result<()> {
        parse_addr("lenode.listen", &self.listen)?;
        check_frame_bytes("lenode.max_payload_bytes", self.max_payload_bytes)?;
        self.msk()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_addr("lenode.listen", &self.listen)
    }

    /// Decoded le-node key.
    pub fn msk(&self) -> Result<Vec<u8>> {
        let key = hex::decode(&self.msk_hex)
            .map_err(|e| bad(format!("lenode.msk_hex is not valid hex: {e}")))?;
        if key.len() < 16 {
            return Err(bad("lenode.msk_hex must decode to at least 16 bytes"));
        }
        Ok(key)
    }
}

/// Board ↔ AAA ↔ ATT relay.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_relay_listen")]
    pub listen: String,

    #[serde(default = "default_reconf_listen")]
    pub reconf_listen: String,

    #[serde(default = "default_backend_addr")]
    pub aaa_addr: String,

    #[serde(default = "default_backend_addr")]
    pub att_addr: String,

    #[serde(default = "default_attestation_interval_ms")]
    pub attestation_interval_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_relay_listen(),
            reconf_listen: default_reconf_listen(),
            aaa_addr: default_backend_addr(),
            att_addr: default_backend_addr(),
            attestation_interval_ms: default_attestation_interval_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl RelaySection {
    pub fn validate(&self) -> Result<()> {
        parse_addr("relay.listen", &self.listen)?;
        parse_addr("relay.reconf_listen", &self.reconf_listen)?;
        parse_addr("relay.aaa_addr", &self.aaa_addr)?;
        parse_addr("relay.att_addr", &self.att_addr)?;
        check_frame_bytes("relay.max_frame_bytes", self.max_frame_bytes)?;
        if !(1000..=3_600_000).contains(&self.attestation_interval_ms) {
            return Err(bad(
                "relay.attestation_interval_ms must be between 1000 and 3600000",
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_addr("relay.listen", &self.listen)
    }
}

/// Device-side ERA agent.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EraSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_era_listen")]
    pub listen: String,

    #[serde(default = "default_era_program")]
    pub program: String,

    /// Pass every frame through the TA decrypt call first.
    #[serde(default = "default_true")]
    pub decrypt: bool,
}

impl Default for EraSection {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_era_listen(),
            program: default_era_program(),
            decrypt: true,
        }
    }
}

impl EraSection {
    pub fn validate(&self) -> Result<()> {
        parse_addr("era.listen", &self.listen)?;
        if self.program.is_empty() {
            return Err(bad("era.program must not be empty"));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_addr("era.listen", &self.listen)
    }
}

fn default_true() -> bool {
    true
}
fn default_bootstrap_listen() -> String {
    "0.0.0.0:33333".into()
}
fn default_psk_key() -> String {
    "eap_psk".into()
}
fn default_msk_key() -> String {
    "eap_msk".into()
}
fn default_max_frame_bytes() -> usize {
    2048
}
fn default_aa_program() -> String {
    "./aa_manager".into()
}
fn default_low_end_a_backend() -> String {
    "127.0.0.1:44100".into()
}
fn default_aa_port_arg() -> String {
    "4444".into()
}
fn default_lenode_listen() -> String {
    "0.0.0.0:4444".into()
}
fn default_lenode_max_payload_bytes() -> usize {
    4096
}
fn default_lenode_msk() -> String {
    DEFAULT_LENODE_MSK.into()
}
fn default_relay_listen() -> String {
    "0.0.0.0:33000".into()
}
fn default_reconf_listen() -> String {
    "0.0.0.0:22000".into()
}
fn default_backend_addr() -> String {
    "127.0.0.1:44000".into()
}
fn default_attestation_interval_ms() -> u64 {
    10_000
}
fn default_era_listen() -> String {
    "0.0.0.0:5025".into()
}
fn default_era_program() -> String {
    "security_api_interface".into()
}
