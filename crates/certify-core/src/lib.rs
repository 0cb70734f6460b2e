//! CERTIFY core: transport-agnostic wire contracts and the error surface.
//!
//! This crate defines the byte layouts spoken by boards, le-nodes, the AAA and
//! ATT backends and the on-device Trusted Application. It carries no runtime or
//! socket dependencies so the same parsers back the gateway servers and tests.
//!
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible paths
//! surface as `CertifyError`/`Result` so a malformed frame from an untrusted
//! device never takes a server down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{CertifyError, Result};
