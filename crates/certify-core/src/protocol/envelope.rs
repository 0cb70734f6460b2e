//! CERTIFY security envelope (panic-free).
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! 0      1        2            4            6      8             12     16          48
//! | auth | encrypt | auth_key_id | enc_key_id | 0x00 | payload_len | 0x00 | auth_tag | payload...
//! ```
//!
//! The tag is HMAC-SHA256 over every header byte except the tag itself, followed
//! by the payload. Unauthenticated envelopes carry an all-zero tag.
//!
//! The `encrypt` flag is framed and tagged but the payload is never transformed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CertifyError, ProtocolError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Fixed header length.
pub const HEADER_LEN: usize = 48;
/// HMAC-SHA256 tag length.
pub const TAG_LEN: usize = 32;
/// Key id sentinel: "use the MSK". Both key ids carry it in current use.
pub const KEY_ID_MSK: u16 = 0x0002;

/// Header bytes covered by the tag (everything before `auth_tag`).
const TAGGED_HEADER_LEN: usize = HEADER_LEN - TAG_LEN;

/// Parsed 48-byte header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub authenticate: bool,
    pub encrypt: bool,
    pub auth_key_id: u16,
    pub enc_key_id: u16,
    /// Number of payload bytes that follow the header.
    pub payload_len: u32,
    pub auth_tag: [u8; TAG_LEN],
}

impl EnvelopeHeader {
    fn tagged_fields(&self) -> [u8; TAGGED_HEADER_LEN] {
        let mut out = [0u8; TAGGED_HEADER_LEN];
        let mut w = &mut out[..];
        w.put_u8(u8::from(self.authenticate));
        w.put_u8(u8::from(self.encrypt));
        w.put_u16(self.auth_key_id);
        w.put_u16(self.enc_key_id);
        w.put_bytes(0, 2);
        w.put_u32(self.payload_len);
        w.put_bytes(0, 4);
        out
    }

    /// Payload length as `usize`.
    pub fn payload_len(&self) -> usize {
        self.payload_len as usize
    }
}

/// A complete envelope (header + payload).
#[derive(Debug, Clone)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub payload: Bytes,
}

impl Envelope {
    /// Verify the tag of this envelope with `key`.
    pub fn verify(&self, key: &[u8]) -> bool {
        verify(&self.header, &self.payload, key)
    }

    /// First payload byte (the le-node `payload_type`), if any.
    pub fn payload_type(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

fn mac_for(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key)
        .map_err(|e| CertifyError::Config(format!("invalid hmac key: {e}")))
}

/// Compute the authentication tag for `header` and `payload`.
///
/// The tag field of `header` is ignored.
pub fn compute_tag(header: &EnvelopeHeader, payload: &[u8], key: &[u8]) -> Result<[u8; TAG_LEN]> {
    let mut mac = mac_for(key)?;
    mac.update(&header.tagged_fields());
    mac.update(payload);

    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

/// Build header + payload.
pub fn encode(payload: &[u8], authenticate: bool, encrypt: bool, key: &[u8]) -> Result<Bytes> {
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::DecodeFailure("payload exceeds u32 length".into()))?;

    let mut header = EnvelopeHeader {
        authenticate,
        encrypt,
        auth_key_id: KEY_ID_MSK,
        enc_key_id: KEY_ID_MSK,
        payload_len,
        auth_tag: [0u8; TAG_LEN],
    };
    if authenticate {
        header.auth_tag = compute_tag(&header, payload, key)?;
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&header.tagged_fields());
    buf.put_slice(&header.auth_tag);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

fn flag(b: u8, name: &str) -> Result<bool> {
    match b {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::DecodeFailure(format!("{name} flag must be 0 or 1, got {other}")).into()),
    }
}

/// Decode the fixed header from the first 48 bytes of `buf`.
///
/// Flags must be 0/1 and reserved bytes zero, so a decoded header re-serializes
/// to exactly the bytes the tag was computed over.
pub fn decode_header(mut buf: &[u8]) -> Result<EnvelopeHeader> {
    if buf.remaining() < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            available: buf.remaining(),
        }
        .into());
    }

    let authenticate = flag(buf.get_u8(), "authenticate")?;
    let encrypt = flag(buf.get_u8(), "encrypt")?;
    let auth_key_id = buf.get_u16();
    let enc_key_id = buf.get_u16();
    if buf.get_u16() != 0 {
        return Err(ProtocolError::DecodeFailure("reserved1 must be zero".into()).into());
    }
    let payload_len = buf.get_u32();
    if buf.get_u32() != 0 {
        return Err(ProtocolError::DecodeFailure("reserved2 must be zero".into()).into());
    }
    let mut auth_tag = [0u8; TAG_LEN];
    buf.copy_to_slice(&mut auth_tag);

    Ok(EnvelopeHeader {
        authenticate,
        encrypt,
        auth_key_id,
        enc_key_id,
        payload_len,
        auth_tag,
    })
}

/// Decode a whole envelope from a buffer holding header and payload.
///
/// Trailing bytes beyond `payload_len` are left out of the payload.
pub fn decode(mut buf: Bytes) -> Result<Envelope> {
    let header = decode_header(&buf)?;
    buf.advance(HEADER_LEN);

    let declared = header.payload_len();
    if buf.remaining() < declared {
        return Err(ProtocolError::LengthMismatch {
            declared,
            received: buf.remaining(),
        }
        .into());
    }

    let payload = buf.copy_to_bytes(declared);
    Ok(Envelope { header, payload })
}

/// Recompute the tag and compare it with the received one in constant time.
///
/// An unauthenticated header verifies only if its tag is all zero.
pub fn verify(header: &EnvelopeHeader, payload: &[u8], key: &[u8]) -> bool {
    if payload.len() != header.payload_len() {
        return false;
    }

    let expected = if header.authenticate {
        match compute_tag(header, payload, key) {
            Ok(t) => t,
            Err(_) => return false,
        }
    } else {
        [0u8; TAG_LEN]
    };

    expected[..].ct_eq(&header.auth_tag[..]).into()
}
