//! Minimal counter registry.
//!
//! Labels are flattened into sorted key vectors to keep deterministic ordering.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 if never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        let mut rows: Vec<(String, u64)> = self
            .map
            .iter()
            .map(|r| {
                let label_str = r
                    .key()
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                (label_str, r.value().load(Ordering::Relaxed))
            })
            .collect();
        rows.sort();
        for (label_str, val) in rows {
            let _ = writeln!(out, "{}{{{}}} {}", name, label_str, val);
        }
    }
}

#[derive(Default)]
pub struct CertifyMetrics {
    /// `server`: bootstrap | lenode | relay | reconf | era
    pub connections: CounterVec,
    /// `reason`: error kind or `unregistered_code`
    pub nacks: CounterVec,
    /// `procedure`, `result`
    pub handshakes: CounterVec,
    /// `leg`: aaa | att | board, `kind`: frame kind
    pub relay_forwards: CounterVec,
}

impl CertifyMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.connections.render("certify_connections_total", &mut out);
        self.nacks.render("certify_nacks_total", &mut out);
        self.handshakes.render("certify_handshakes_total", &mut out);
        self.relay_forwards.render("certify_relay_forwards_total", &mut out);
        out
    }

    pub fn handshake(&self, procedure: &str, ok: bool) {
        let result = if ok { "ok" } else { "failed" };
        self.handshakes
            .inc(&[("procedure", procedure), ("result", result)]);
    }
}
