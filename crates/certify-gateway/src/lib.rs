//! CERTIFY enrolment gateway library entry.
//!
//! Wires the bootstrap dispatcher and its device flows, the le-node session
//! server, the board relay proxy and the device-side ERA agent into one
//! daemon. Consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod era;
pub mod lenode;
pub mod obs;
pub mod relay;
pub mod server;
pub mod services;
pub mod transport;
