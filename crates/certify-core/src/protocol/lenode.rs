//! Payloads exchanged with RISC-V le-nodes inside a CERTIFY envelope.
//!
//! Every payload starts with a one-byte `payload_type`. Fixed offsets:
//!
//! | type | name     | layout                                                        |
//! |------|----------|---------------------------------------------------------------|
//! | 9    | MUD URL  | code:u8, mud_len:u32 @2, url @16                              |
//! | 10   | POLICIES | policies_len:u32 @1, 11 zero bytes, records @16               |
//! | 13   | CLG      | 15 zero bytes, challenge[64] @16                              |
//! | 14   | RSP      | 15 zero bytes, response[64] @16                               |
//! | 15   | ACK      | status:u32 @1                                                 |
//!
//! The expected RSP for a challenge is `HMAC-SHA256(key, clg)` padded with 32
//! zero bytes to the 64-byte response field.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CertifyError, Layer, ProtocolError, Result};
use crate::protocol::bootstrap::BootstrapCode;

type HmacSha256 = Hmac<Sha256>;

pub const PT_MUD_URL: u8 = 9;
pub const PT_POLICIES: u8 = 10;
pub const PT_CLG: u8 = 13;
pub const PT_RSP: u8 = 14;
pub const PT_ACK: u8 = 15;

/// Challenge and response field length.
pub const CHALLENGE_LEN: usize = 64;
/// Every fixed field after the type byte starts here.
const BODY_OFFSET: usize = 16;
/// One policy record.
pub const POLICY_RECORD_LEN: usize = 48;
/// ACK status meaning "policy applied".
pub const ACK_APPLIED: u32 = 1;

/// MUD claim sent by a le-node as its first envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeNodeMud {
    /// Raw code byte; le-nodes are expected to send `0x04`.
    pub code: u8,
    pub mud_url: String,
}

impl LeNodeMud {
    pub fn code(&self) -> Option<BootstrapCode> {
        BootstrapCode::try_from(self.code).ok()
    }
}

/// Decoded le-node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeNodePayload {
    MudUrl(LeNodeMud),
    Policies { records: Bytes },
    Challenge([u8; CHALLENGE_LEN]),
    Response([u8; CHALLENGE_LEN]),
    Ack { status: u32 },
    Unknown(u8),
}

impl LeNodePayload {
    pub fn payload_type(&self) -> u8 {
        match self {
            LeNodePayload::MudUrl(_) => PT_MUD_URL,
            LeNodePayload::Policies { .. } => PT_POLICIES,
            LeNodePayload::Challenge(_) => PT_CLG,
            LeNodePayload::Response(_) => PT_RSP,
            LeNodePayload::Ack { .. } => PT_ACK,
            LeNodePayload::Unknown(t) => *t,
        }
    }

    /// Turn an `Unknown` variant into the matching protocol error.
    pub fn unknown_as_error(&self) -> CertifyError {
        ProtocolError::UnknownType {
            layer: Layer::LeNodePayload,
            tag: self.payload_type(),
        }
        .into()
    }
}

fn need(buf: &[u8], n: usize) -> Result<()> {
    if buf.len() < n {
        return Err(ProtocolError::Truncated {
            needed: n,
            available: buf.len(),
        }
        .into());
    }
    Ok(())
}

fn field64(payload: &[u8]) -> Result<[u8; CHALLENGE_LEN]> {
    need(payload, BODY_OFFSET + CHALLENGE_LEN)?;
    let mut out = [0u8; CHALLENGE_LEN];
    out.copy_from_slice(&payload[BODY_OFFSET..BODY_OFFSET + CHALLENGE_LEN]);
    Ok(out)
}

/// Decode an envelope payload.
pub fn decode_payload(payload: &[u8]) -> Result<LeNodePayload> {
    let Some(&payload_type) = payload.first() else {
        return Err(ProtocolError::Truncated { needed: 1, available: 0 }.into());
    };

    match payload_type {
        PT_MUD_URL => {
            need(payload, BODY_OFFSET)?;
            let mut fields = &payload[1..];
            let code = fields.get_u8();
            let mud_len = fields.get_u32() as usize;

            let url = &payload[BODY_OFFSET..];
            need(url, mud_len)?;
            let url = &url[..mud_len];
            if !url.is_ascii() {
                return Err(ProtocolError::DecodeFailure("mud url is not ascii".into()).into());
            }
            let mud_url = String::from_utf8_lossy(url).into_owned();
            Ok(LeNodePayload::MudUrl(LeNodeMud { code, mud_url }))
        }
        PT_POLICIES => {
            need(payload, BODY_OFFSET)?;
            let mut fields = &payload[1..];
            let policies_len = fields.get_u32() as usize;
            let records = &payload[BODY_OFFSET..];
            need(records, policies_len)?;
            Ok(LeNodePayload::Policies {
                records: Bytes::copy_from_slice(&records[..policies_len]),
            })
        }
        PT_CLG => Ok(LeNodePayload::Challenge(field64(payload)?)),
        PT_RSP => Ok(LeNodePayload::Response(field64(payload)?)),
        PT_ACK => {
            need(payload, 5)?;
            let mut fields = &payload[1..];
            Ok(LeNodePayload::Ack {
                status: fields.get_u32(),
            })
        }
        other => Ok(LeNodePayload::Unknown(other)),
    }
}

fn with_body(payload_type: u8, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(BODY_OFFSET + body.len());
    buf.put_u8(payload_type);
    buf.put_bytes(0, BODY_OFFSET - 1);
    buf.put_slice(body);
    buf.freeze()
}

/// CLG payload carrying `challenge`.
pub fn clg_message(challenge: &[u8; CHALLENGE_LEN]) -> Bytes {
    with_body(PT_CLG, challenge)
}

/// RSP payload carrying `response` (device side, tests).
pub fn rsp_message(response: &[u8; CHALLENGE_LEN]) -> Bytes {
    with_body(PT_RSP, response)
}

/// ACK payload (device side, tests).
pub fn ack_message(status: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(PT_ACK);
    buf.put_u32(status);
    buf.freeze()
}

/// MUD URL payload (device side, tests).
pub fn mud_message(code: u8, mud_url: &str) -> Result<Bytes> {
    let url = mud_url.as_bytes();
    let mud_len = u32::try_from(url.len())
        .map_err(|_| ProtocolError::DecodeFailure("mud url exceeds u32 length".into()))?;
    let mut buf = BytesMut::with_capacity(BODY_OFFSET + url.len());
    buf.put_u8(PT_MUD_URL);
    buf.put_u8(code);
    buf.put_u32(mud_len);
    buf.put_bytes(0, BODY_OFFSET - 6);
    buf.put_slice(url);
    Ok(buf.freeze())
}

/// POLICIES payload with the single policy "authenticate every message from now on".
pub fn require_auth_policy_message() -> Bytes {
    let mut record = [0u8; POLICY_RECORD_LEN];
    record[..3].copy_from_slice(&[1, 1, 1]);

    let mut buf = BytesMut::with_capacity(BODY_OFFSET + POLICY_RECORD_LEN);
    buf.put_u8(PT_POLICIES);
    buf.put_u32(POLICY_RECORD_LEN as u32);
    buf.put_bytes(0, BODY_OFFSET - 5);
    buf.put_slice(&record);
    buf.freeze()
}

/// Expected response field for `challenge`: HMAC-SHA256 followed by 32 zero bytes.
pub fn expected_response(key: &[u8], challenge: &[u8]) -> Result<[u8; CHALLENGE_LEN]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CertifyError::Config(format!("invalid hmac key: {e}")))?;
    mac.update(challenge);

    let mut out = [0u8; CHALLENGE_LEN];
    out[..32].copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Constant-time check of a received response field.
pub fn response_matches(key: &[u8], challenge: &[u8], response: &[u8]) -> bool {
    match expected_response(key, challenge) {
        Ok(expected) => expected[..].ct_eq(response).into(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;

    const KEY: [u8; 32] = [0x24; 32];

    #[test]
    fn clg_layout() {
        let clg = [0xab; CHALLENGE_LEN];
        let msg = clg_message(&clg);
        assert_eq!(msg.len(), 80);
        assert_eq!(msg[0], PT_CLG);
        assert!(msg[1..16].iter().all(|b| *b == 0));
        assert_eq!(decode_payload(&msg).unwrap(), LeNodePayload::Challenge(clg));
    }

    #[test]
    fn policy_message_layout() {
        let msg = require_auth_policy_message();
        assert_eq!(msg.len(), 64);
        assert_eq!(&msg[..5], &[PT_POLICIES, 0, 0, 0, 48]);
        assert_eq!(&msg[16..19], &[1, 1, 1]);
        assert!(msg[19..].iter().all(|b| *b == 0));
    }

    #[test]
    fn mud_roundtrip_and_short_url() {
        let msg = mud_message(0x04, "coap://lenode").unwrap();
        match decode_payload(&msg).unwrap() {
            LeNodePayload::MudUrl(m) => {
                assert_eq!(m.code(), Some(BootstrapCode::LowEndB));
                assert_eq!(m.mud_url, "coap://lenode");
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut short = msg.to_vec();
        short.truncate(20);
        assert!(matches!(
            decode_payload(&short).unwrap_err(),
            CertifyError::Protocol(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn non_ascii_mud_is_decode_failure() {
        let mut msg = mud_message(0x04, "ab").unwrap().to_vec();
        msg[16] = 0xc3;
        assert!(matches!(
            decode_payload(&msg).unwrap_err(),
            CertifyError::Protocol(ProtocolError::DecodeFailure(_))
        ));
    }

    #[test]
    fn only_the_exact_response_matches() {
        let clg = [7u8; CHALLENGE_LEN];
        let good = expected_response(&KEY, &clg).unwrap();
        assert!(good[32..].iter().all(|b| *b == 0));
        assert!(response_matches(&KEY, &clg, &good));

        for i in 0..CHALLENGE_LEN {
            let mut bad = good;
            bad[i] ^= 0x01;
            assert!(!response_matches(&KEY, &clg, &bad), "byte {i}");
        }
        assert!(!response_matches(&KEY, &clg, &good[..63]));
        let mut longer = good.to_vec();
        longer.push(0);
        assert!(!response_matches(&KEY, &clg, &longer));
    }

    #[test]
    fn ack_and_unknown() {
        assert_eq!(decode_payload(&ack_message(1)).unwrap(), LeNodePayload::Ack { status: 1 });
        assert_eq!(decode_payload(&[0x42]).unwrap(), LeNodePayload::Unknown(0x42));
        assert!(decode_payload(&[PT_ACK, 0, 0]).is_err());
    }
}
