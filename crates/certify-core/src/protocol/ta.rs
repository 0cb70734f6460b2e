//! Byte conventions for the on-device Trusted Application executable.
//!
//! Arguments travel through `argv`, which cannot hold NUL bytes:
//! - reconfigure data is shifted up by one before the call;
//! - decrypt input escapes `0x00` as `FF 01` and `0xFF` as `FF FF`;
//! - decrypt output follows the `decrypted: ` marker and is shifted down by one.
//!
//! Also decodes the ERA agent's reconfiguration frame:
//! `0x02`, `code:u8 (0x02)`, `bin_len:u16`, then `opcode:u8` and its data.

use bytes::Buf;

use crate::error::{CertifyError, Layer, ProtocolError, Result};

/// Marker preceding the plaintext in decrypt output.
pub const DECRYPTED_MARKER: &[u8] = b"decrypted: ";

/// Reconfiguration frame type understood by the ERA agent.
pub const RECONF_PAYLOAD_TYPE: u8 = 0x02;
/// Only high-end devices take reconfiguration frames.
pub const RECONF_DEVICE_CODE: u8 = 0x02;

/// Shift every byte up by one for the reconfigure call.
///
/// `0xFF` has no representation after the shift.
pub fn shift_up(data: &[u8]) -> Result<Vec<u8>> {
    data.iter()
        .map(|b| {
            b.checked_add(1).ok_or_else(|| {
                CertifyError::from(ProtocolError::DecodeFailure(
                    "0xff cannot be shifted for the trusted app".into(),
                ))
            })
        })
        .collect()
}

/// Undo `shift_up` on executable output.
pub fn shift_down(data: &[u8]) -> Result<Vec<u8>> {
    data.iter()
        .map(|b| {
            b.checked_sub(1).ok_or_else(|| {
                CertifyError::from(ProtocolError::DecodeFailure("0x00 in trusted app output".into()))
            })
        })
        .collect()
}

/// Escape ciphertext for the decrypt call.
pub fn escape_for_decrypt(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    for &b in data {
        match b {
            0x00 => out.extend_from_slice(&[0xff, 0x01]),
            0xff => out.extend_from_slice(&[0xff, 0xff]),
            other => out.push(other),
        }
    }
    out
}

/// Extract and unshift the plaintext from decrypt stdout.
///
/// The plaintext runs from the first marker up to the next one, or the end.
pub fn decrypted_payload(stdout: &[u8]) -> Result<Vec<u8>> {
    let start = find(stdout, DECRYPTED_MARKER)
        .ok_or_else(|| ProtocolError::DecodeFailure("decrypt output has no marker".into()))?
        + DECRYPTED_MARKER.len();
    let rest = &stdout[start..];
    let end = find(rest, DECRYPTED_MARKER).unwrap_or(rest.len());
    shift_down(&rest[..end])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reconfiguration command for the Trusted Application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconfigurationRequest {
    pub opcode: u8,
    pub data: Vec<u8>,
}

/// Decode a (decrypted) ERA reconfiguration frame.
pub fn decode_reconfiguration(mut buf: &[u8]) -> Result<ReconfigurationRequest> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated {
            needed: 4,
            available: buf.remaining(),
        }
        .into());
    }

    let payload_type = buf.get_u8();
    if payload_type != RECONF_PAYLOAD_TYPE {
        return Err(ProtocolError::UnknownType {
            layer: Layer::Reconfiguration,
            tag: payload_type,
        }
        .into());
    }
    let code = buf.get_u8();
    if code != RECONF_DEVICE_CODE {
        return Err(ProtocolError::UnknownType {
            layer: Layer::BootstrapCode,
            tag: code,
        }
        .into());
    }

    let bin_len = buf.get_u16() as usize;
    if bin_len == 0 || buf.remaining() < bin_len {
        return Err(ProtocolError::Truncated {
            needed: bin_len.max(1),
            available: buf.remaining(),
        }
        .into());
    }

    let opcode = buf.get_u8();
    let data = buf[..bin_len - 1].to_vec();
    Ok(ReconfigurationRequest { opcode, data })
}
