#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use certify_core::error::{CertifyError, Result};
use certify_core::protocol::ta::ReconfigurationRequest;
use certify_gateway::era::{EraAgent, SecurityApiInterface, TrustedApp};
use certify_gateway::obs::CertifyMetrics;

#[derive(Default)]
struct MockTa {
    decrypted: Mutex<Vec<Vec<u8>>>,
    applied: Mutex<Vec<ReconfigurationRequest>>,
    fail_reconfigure: bool,
}

#[async_trait]
impl TrustedApp for MockTa {
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decrypted.lock().unwrap().push(ciphertext.to_vec());
        // "decryption" strips a one-byte prefix
        Ok(ciphertext.get(1..).unwrap_or_default().to_vec())
    }

    async fn reconfigure(&self, req: &ReconfigurationRequest) -> Result<()> {
        if self.fail_reconfigure {
            return Err(CertifyError::Backend("reconfigure exited with 1".into()));
        }
        self.applied.lock().unwrap().push(req.clone());
        Ok(())
    }
}

fn spawn(ta: Arc<MockTa>, decrypt: bool) -> DuplexStream {
    let (peer_side, agent_side) = duplex(4096);
    let agent = EraAgent::new(ta, decrypt, Arc::new(CertifyMetrics::default()));
    let peer: SocketAddr = "10.0.0.1:5025".parse().unwrap();
    tokio::spawn(async move { agent.serve_connection(peer, agent_side).await });
    peer_side
}

async fn reply(s: &mut DuplexStream) -> [u8; 2] {
    let mut buf = [0u8; 2];
    s.read_exact(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn reconfiguration_is_applied() {
    let ta = Arc::new(MockTa::default());
    let mut s = spawn(Arc::clone(&ta), false);

    s.write_all(&[0x02, 0x02, 0x00, 0x03, 0x07, 0xaa, 0xbb]).await.unwrap();
    assert_eq!(&reply(&mut s).await, b"OK");

    let applied = ta.applied.lock().unwrap().clone();
    assert_eq!(
        applied,
        vec![ReconfigurationRequest {
            opcode: 0x07,
            data: vec![0xaa, 0xbb]
        }]
    );
    assert!(ta.decrypted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn frames_pass_through_decrypt_when_enabled() {
    let ta = Arc::new(MockTa::default());
    let mut s = spawn(Arc::clone(&ta), true);

    s.write_all(&[0xee, 0x02, 0x02, 0x00, 0x01, 0x05]).await.unwrap();
    assert_eq!(&reply(&mut s).await, b"OK");
    assert_eq!(ta.decrypted.lock().unwrap().len(), 1);
    assert_eq!(ta.applied.lock().unwrap()[0].opcode, 0x05);
}

#[tokio::test]
async fn wrong_type_or_code_is_ko_and_connection_stays_open() {
    let ta = Arc::new(MockTa::default());
    let mut s = spawn(Arc::clone(&ta), false);

    s.write_all(&[0x01, 0x02, 0x00, 0x01, 0x05]).await.unwrap();
    assert_eq!(&reply(&mut s).await, b"KO");

    s.write_all(&[0x02, 0x03, 0x00, 0x01, 0x05]).await.unwrap();
    assert_eq!(&reply(&mut s).await, b"KO");

    s.write_all(&[0x02, 0x02, 0x00, 0x01, 0x05]).await.unwrap();
    assert_eq!(&reply(&mut s).await, b"OK");
    assert_eq!(ta.applied.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_reconfigure_is_ko() {
    let ta = Arc::new(MockTa {
        fail_reconfigure: true,
        ..MockTa::default()
    });
    let mut s = spawn(ta, false);

    s.write_all(&[0x02, 0x02, 0x00, 0x01, 0x05]).await.unwrap();
    assert_eq!(&reply(&mut s).await, b"KO");
}

#[cfg(unix)]
#[tokio::test]
async fn security_api_interface_runs_the_program() {
    // `echo` exits 0 without a decrypt marker
    let ta = SecurityApiInterface::new("echo");
    ta.reconfigure(&ReconfigurationRequest {
        opcode: 0x07,
        data: vec![0x00, 0x41],
    })
    .await
    .unwrap();

    let err = ta.decrypt(&[0x00, 0xff]).await.unwrap_err();
    assert_eq!(err.kind(), "decode_failure");

    let missing = SecurityApiInterface::new("/nonexistent/security_api_interface");
    let err = missing.decrypt(&[0x41]).await.unwrap_err();
    assert_eq!(err.kind(), "backend");
}
