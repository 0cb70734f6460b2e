//! Relay path message kinds (board ↔ AAA ↔ ATT).
//!
//! This path carries no envelope: the first byte of each frame is its type,
//! and authentication is the AAA server's job. Every layer decodes into a
//! closed enum whose `Unknown` arm is logged and dropped by the caller.

/// MUD URL claim (board → AAA), also a reconfiguration frame on the push channel.
pub const MT_MUD_CLAIM: u8 = 0x01;
/// Reconfiguration frame (AAA → board) or its ACK (board → AAA).
pub const MT_RECONF: u8 = 0x02;
/// Attestation log (board → ATT).
pub const MT_ATT_LOG: u8 = 0x04;
/// Challenge (AAA → board).
pub const MT_CHALLENGE: u8 = 0x05;
/// Signature + random (board → AAA during bootstrap, board → ATT afterwards).
pub const MT_SIGNATURE_RANDOM: u8 = 0x07;
/// ACK/NACK verdict (AAA/ATT → board).
pub const MT_VERDICT: u8 = 0x08;

/// Sent to the board when the attestation phase starts ("ATT_S").
pub const ATT_START: [u8; 9] = [0x00, 0x01, 0x00, 0x05, b'A', b'T', b'T', b'_', b'S'];
/// Periodic attestation probe sent to the board ("ATT_D").
pub const ATT_DONE: [u8; 9] = [0x00, 0x01, 0x00, 0x05, b'A', b'T', b'T', b'_', b'D'];

/// Liveness probe marker inside a text frame.
const HELLO: &str = "Hello";

/// Board frames while the session is bootstrapping, keyed by the first byte.
///
/// A "Hello" text is echoed by the caller before this dispatch and does not
/// change the kind: a MUD claim whose URL contains "Hello" is still a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardFrame {
    MudClaim,
    SignatureRandom,
    ReconfAck,
    Unknown(u8),
}

impl BoardFrame {
    /// `None` for an empty frame.
    pub fn classify(frame: &[u8]) -> Option<Self> {
        let &first = frame.first()?;
        Some(match first {
            MT_MUD_CLAIM => BoardFrame::MudClaim,
            MT_SIGNATURE_RANDOM => BoardFrame::SignatureRandom,
            MT_RECONF => BoardFrame::ReconfAck,
            other => BoardFrame::Unknown(other),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoardFrame::MudClaim => "mud_claim",
            BoardFrame::SignatureRandom => "signature_random",
            BoardFrame::ReconfAck => "reconf_ack",
            BoardFrame::Unknown(_) => "unknown",
        }
    }
}

/// Board frames once the session is in the attestation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationFrame {
    SignatureRandom,
    AttestationLog,
    Unknown(u8),
}

impl AttestationFrame {
    pub fn classify(frame: &[u8]) -> Option<Self> {
        let &first = frame.first()?;
        Some(match first {
            MT_SIGNATURE_RANDOM => AttestationFrame::SignatureRandom,
            MT_ATT_LOG => AttestationFrame::AttestationLog,
            other => AttestationFrame::Unknown(other),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttestationFrame::SignatureRandom => "signature_random",
            AttestationFrame::AttestationLog => "attestation_log",
            AttestationFrame::Unknown(_) => "unknown",
        }
    }
}

/// Replies from the AAA or ATT backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendReply {
    Challenge,
    Verdict,
    Other(u8),
    Empty,
}

impl BackendReply {
    pub fn classify(frame: &[u8]) -> Self {
        match frame.first() {
            None => BackendReply::Empty,
            Some(&MT_CHALLENGE) => BackendReply::Challenge,
            Some(&MT_VERDICT) => BackendReply::Verdict,
            Some(&other) => BackendReply::Other(other),
        }
    }
}

/// Frames pushed by the AAA server on the reconfiguration channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFrame {
    /// `0x01` or `0x02`: forwarded to the board unmodified.
    Reconfiguration(u8),
    Unknown(u8),
}

impl PushFrame {
    pub fn classify(frame: &[u8]) -> Option<Self> {
        let &first = frame.first()?;
        Some(match first {
            MT_MUD_CLAIM | MT_RECONF => PushFrame::Reconfiguration(first),
            other => PushFrame::Unknown(other),
        })
    }
}

/// True if the frame is UTF-8 text containing "Hello".
pub fn is_hello(frame: &[u8]) -> bool {
    std::str::from_utf8(frame)
        .map(|s| s.contains(HELLO))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_frames() {
        assert_eq!(BoardFrame::classify(b"Hello board"), Some(BoardFrame::Unknown(b'H')));
        assert_eq!(BoardFrame::classify(&[0x01, 0xaa]), Some(BoardFrame::MudClaim));
        assert_eq!(BoardFrame::classify(&[0x07]), Some(BoardFrame::SignatureRandom));
        assert_eq!(BoardFrame::classify(&[0x02]), Some(BoardFrame::ReconfAck));
        assert_eq!(BoardFrame::classify(&[0xff, 0x01]), Some(BoardFrame::Unknown(0xff)));
        assert_eq!(BoardFrame::classify(&[]), None);
    }

    #[test]
    fn hello_does_not_change_the_kind() {
        assert!(!is_hello(&[0xff, b'H', b'e', b'l', b'l', b'o']));

        let claim = b"\x01\x00\x12https://Hello.mud/";
        assert!(is_hello(claim));
        assert_eq!(BoardFrame::classify(claim), Some(BoardFrame::MudClaim));
    }

    #[test]
    fn backend_and_push_frames() {
        assert_eq!(BackendReply::classify(&[0x05, 1, 2]), BackendReply::Challenge);
        assert_eq!(BackendReply::classify(&[0x08]), BackendReply::Verdict);
        assert_eq!(BackendReply::classify(&[0x09]), BackendReply::Other(0x09));
        assert_eq!(BackendReply::classify(&[]), BackendReply::Empty);

        assert_eq!(PushFrame::classify(&[0x02, 0]), Some(PushFrame::Reconfiguration(0x02)));
        assert_eq!(PushFrame::classify(&[0x03]), Some(PushFrame::Unknown(0x03)));
        assert_eq!(AttestationFrame::classify(&[0x04]), Some(AttestationFrame::AttestationLog));
    }

    #[test]
    fn probes_spell_their_names() {
        assert_eq!(&ATT_START[4..], b"ATT_S");
        assert_eq!(&ATT_DONE[4..], b"ATT_D");
    }
}
