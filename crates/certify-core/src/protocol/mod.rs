//! Wire formats.
//!
//! - `envelope`: the 48-byte CERTIFY security header and its HMAC tag.
//! - `bootstrap`: first message on the dispatcher port (shapes A and B).
//! - `lenode`: payloads carried inside envelopes for RISC-V le-nodes.
//! - `relay`: first-byte message kinds on the board/AAA/ATT relay path.
//! - `ta`: byte conventions for calling the on-device Trusted Application.
//!
//! Parsers never index raw buffers without a length check; short or unknown
//! input is reported as `ProtocolError`.

pub mod bootstrap;
pub mod envelope;
pub mod lenode;
pub mod relay;
pub mod ta;
