//! Transport layer (raw TCP).
//!
//! Every server reads through the same helpers: a bounded single read for
//! first-byte protocols and an exact-length read for enveloped ones.

pub mod framing;

pub use framing::{read_envelope, read_frame, send_envelope, send_reply, BoxedStream, DeviceStream};
