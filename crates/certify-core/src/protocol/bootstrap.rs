//! First message on the bootstrapping port (panic-free).
//!
//! Two shapes, selected by byte 0 (`payload_type`):
//!
//! - `0x00` certified: a 40-byte security header precedes the claim. The MUD URL
//!   length is a u32 at header offset 2 and the URL starts at header offset 16.
//!   The bootstrap code is implicitly `LowEndB`.
//! - `0x01` plain: `code:u8`, `mud_len:u16`, then the URL.
//!
//! URLs are UTF-8. A declared length larger than the buffer is `Truncated`.

use bytes::Buf;

use crate::error::{Layer, ProtocolError, Result};

/// `payload_type` of the certified shape.
pub const PAYLOAD_CERTIFIED: u8 = 0x00;
/// `payload_type` of the plain shape.
pub const PAYLOAD_PLAIN: u8 = 0x01;
/// Security header length preceding a certified claim.
pub const SECURITY_HEADER_LEN: usize = 40;

/// Offset of the MUD length field inside the certified shape.
const CERTIFIED_LEN_OFFSET: usize = SECURITY_HEADER_LEN + 2;
/// Offset of the MUD URL inside the certified shape.
const CERTIFIED_URL_OFFSET: usize = SECURITY_HEADER_LEN + 16;

/// Device class selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapCode {
    /// Low-end COTS device, variant A.
    LowEndA,
    /// High-end device deriving the primary (PSK) key.
    HighEndPrimary,
    /// High-end device deriving the secondary (MSK) key.
    HighEndSecondary,
    /// Low-end device, variant B (RISC-V le-node).
    LowEndB,
}

impl BootstrapCode {
    pub const ALL: [BootstrapCode; 4] = [
        BootstrapCode::LowEndA,
        BootstrapCode::HighEndPrimary,
        BootstrapCode::HighEndSecondary,
        BootstrapCode::LowEndB,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            BootstrapCode::LowEndA => 0x01,
            BootstrapCode::HighEndPrimary => 0x02,
            BootstrapCode::HighEndSecondary => 0x03,
            BootstrapCode::LowEndB => 0x04,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapCode::LowEndA => "low_end_a",
            BootstrapCode::HighEndPrimary => "high_end_primary",
            BootstrapCode::HighEndSecondary => "high_end_secondary",
            BootstrapCode::LowEndB => "low_end_b",
        }
    }
}

impl TryFrom<u8> for BootstrapCode {
    type Error = ProtocolError;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x01 => Ok(BootstrapCode::LowEndA),
            0x02 => Ok(BootstrapCode::HighEndPrimary),
            0x03 => Ok(BootstrapCode::HighEndSecondary),
            0x04 => Ok(BootstrapCode::LowEndB),
            tag => Err(ProtocolError::UnknownType {
                layer: Layer::BootstrapCode,
                tag,
            }),
        }
    }
}

/// Which wire shape carried the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Certified,
    Plain,
}

/// Decoded bootstrap claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub shape: Shape,
    pub code: BootstrapCode,
    pub mud_url: String,
}

fn need(buf: &[u8], n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(ProtocolError::Truncated {
            needed: n,
            available: buf.remaining(),
        }
        .into());
    }
    Ok(())
}

fn utf8_url(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| ProtocolError::DecodeFailure(format!("mud url is not utf-8: {e}")).into())
}

/// Decode the first message of a bootstrapping connection.
pub fn decode_bootstrap(buf: &[u8]) -> Result<BootstrapRequest> {
    let Some(&payload_type) = buf.first() else {
        return Err(ProtocolError::Truncated { needed: 1, available: 0 }.into());
    };

    match payload_type {
        PAYLOAD_CERTIFIED => decode_certified(buf),
        PAYLOAD_PLAIN => decode_plain(buf),
        tag => Err(ProtocolError::UnknownType {
            layer: Layer::BootstrapPayload,
            tag,
        }
        .into()),
    }
}

fn decode_certified(buf: &[u8]) -> Result<BootstrapRequest> {
    need(buf, CERTIFIED_URL_OFFSET)?;

    let mut len_field = &buf[CERTIFIED_LEN_OFFSET..];
    let mud_len = len_field.get_u32() as usize;

    let url = &buf[CERTIFIED_URL_OFFSET..];
    need(url, mud_len)?;

    Ok(BootstrapRequest {
        shape: Shape::Certified,
        code: BootstrapCode::LowEndB,
        mud_url: utf8_url(&url[..mud_len])?,
    })
}

fn decode_plain(mut buf: &[u8]) -> Result<BootstrapRequest> {
    need(buf, 4)?;
    buf.advance(1);

    let raw_code = buf.get_u8();
    let mud_len = buf.get_u16() as usize;
    need(buf, mud_len)?;
    let mud_url = utf8_url(&buf[..mud_len])?;

    Ok(BootstrapRequest {
        shape: Shape::Plain,
        code: BootstrapCode::try_from(raw_code)?,
        mud_url,
    })
}

/// Encode a plain-shape claim (device side, tests).
///
/// The length field is a u16; longer URLs are refused rather than cut.
pub fn encode_plain(code: BootstrapCode, mud_url: &str) -> Result<Vec<u8>> {
    let url = mud_url.as_bytes();
    let len = u16::try_from(url.len()).map_err(|_| {
        ProtocolError::DecodeFailure(format!("mud url of {} bytes exceeds u16 length", url.len()))
    })?;
    let mut out = Vec::with_capacity(4 + url.len());
    out.push(PAYLOAD_PLAIN);
    out.push(code.as_u8());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(url);
    Ok(out)
}
