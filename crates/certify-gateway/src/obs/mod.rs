//! Lightweight in-process metrics.
//!
//! Counters are stored as atomics behind `DashMap` and rendered in the
//! Prometheus text format. The daemon logs the rendered snapshot at shutdown.

pub mod metrics;

pub use metrics::{CertifyMetrics, CounterVec};
