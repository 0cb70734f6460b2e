//! Top-level facade crate for the CERTIFY enrolment gateway.
//!
//! Re-exports the wire contracts and the gateway servers so users can depend on a single crate.

pub mod core {
    pub use certify_core::*;
}

pub mod gateway {
    pub use certify_gateway::*;
}
