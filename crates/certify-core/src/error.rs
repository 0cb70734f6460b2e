//! Shared error type across CERTIFY crates.

use thiserror::Error;

/// Two-byte replies a device can observe (stable wire API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// "OK" acknowledgement.
    Ok,
    /// "KO" negative acknowledgement.
    Ko,
}

impl Reply {
    /// Wire bytes for this reply.
    pub fn as_bytes(self) -> &'static [u8; 2] {
        match self {
            Reply::Ok => b"OK",
            Reply::Ko => b"KO",
        }
    }
}

/// Protocol layer a tag was read from, used to label `UnknownType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Dispatcher first byte (`payload_type`).
    BootstrapPayload,
    /// Bootstrap code following the payload type.
    BootstrapCode,
    /// Payload type inside a le-node envelope.
    LeNodePayload,
    /// First byte of a relay frame.
    RelayFrame,
    /// First byte of an ERA reconfiguration frame.
    Reconfiguration,
}

impl Layer {
    pub fn as_str(self) -> &'static str {
        match self {
            Layer::BootstrapPayload => "bootstrap_payload",
            Layer::BootstrapCode => "bootstrap_code",
            Layer::LeNodePayload => "lenode_payload",
            Layer::RelayFrame => "relay_frame",
            Layer::Reconfiguration => "reconfiguration",
        }
    }
}

/// Framing and decoding failures on untrusted bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("length mismatch: declared {declared} payload bytes, received {received}")]
    LengthMismatch { declared: usize, received: usize },
    #[error("payload too large: declared {declared} bytes, limit {max}")]
    PayloadTooLarge { declared: usize, max: usize },
    #[error("unknown {} tag 0x{tag:02x}", layer.as_str())]
    UnknownType { layer: Layer, tag: u8 },
    #[error("decode failure: {0}")]
    DecodeFailure(String),
}

/// Keyed authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication tag mismatch")]
    TagMismatch,
    #[error("challenge response mismatch")]
    ResponseMismatch,
    #[error("unauthenticated message rejected")]
    Unauthenticated,
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CertifyError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum CertifyError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("backend: {0}")]
    Backend(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
}

impl CertifyError {
    /// Map an error to what the peer gets to see, if anything.
    ///
    /// `None` means the connection is no longer usable and is simply closed.
    pub fn reply(&self) -> Option<Reply> {
        match self {
            CertifyError::Protocol(ProtocolError::UnknownType { .. })
            | CertifyError::Protocol(ProtocolError::DecodeFailure(_))
            | CertifyError::Protocol(ProtocolError::Truncated { .. }) => Some(Reply::Ko),
            CertifyError::Backend(_) => Some(Reply::Ko),
            CertifyError::Protocol(ProtocolError::LengthMismatch { .. })
            | CertifyError::Protocol(ProtocolError::PayloadTooLarge { .. }) => None,
            CertifyError::Auth(_) => None,
            CertifyError::Io(_) => None,
            CertifyError::Config(_) => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CertifyError::Protocol(ProtocolError::Truncated { .. }) => "truncated",
            CertifyError::Protocol(ProtocolError::LengthMismatch { .. }) => "length_mismatch",
            CertifyError::Protocol(ProtocolError::PayloadTooLarge { .. }) => "payload_too_large",
            CertifyError::Protocol(ProtocolError::UnknownType { .. }) => "unknown_type",
            CertifyError::Protocol(ProtocolError::DecodeFailure(_)) => "decode_failure",
            CertifyError::Auth(_) => "auth",
            CertifyError::Backend(_) => "backend",
            CertifyError::Io(_) => "io",
            CertifyError::Config(_) => "config",
        }
    }
}
