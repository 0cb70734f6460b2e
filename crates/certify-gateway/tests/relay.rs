#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use certify_core::error::Result;
use certify_core::protocol::relay::{ATT_DONE, ATT_START};
use certify_gateway::obs::CertifyMetrics;
use certify_gateway::relay::{proxy, BackendClient, RelayContext};
use certify_gateway::transport::read_frame;

const WAIT: Duration = Duration::from_secs(5);

/// Scripted backend: records every request and answers with `reply(request)`.
async fn mock_backend(reply: fn(&[u8]) -> Option<Vec<u8>>) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = listener.accept().await.unwrap();
            let Some(req) = read_frame(&mut conn, 2048).await.unwrap() else {
                continue;
            };
            let _ = tx.send(req.to_vec());
            if let Some(resp) = reply(&req) {
                conn.write_all(&resp).await.unwrap();
            }
        }
    });
    (addr, rx)
}

/// An address nothing listens on.
async fn free_addr() -> SocketAddr {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    l.local_addr().unwrap()
}

fn context(aaa: SocketAddr, att: SocketAddr, reconf: SocketAddr, interval: Duration) -> Arc<RelayContext> {
    Arc::new(RelayContext {
        aaa: BackendClient::new("aaa", aaa.to_string(), 2048),
        att: BackendClient::new("att", att.to_string(), 2048),
        reconf_listen: reconf,
        attestation_interval: interval,
        max_frame_bytes: 2048,
        metrics: Arc::new(CertifyMetrics::default()),
        shutdown: CancellationToken::new(),
    })
}

fn spawn_board(relay: Arc<RelayContext>) -> (DuplexStream, JoinHandle<Result<()>>) {
    let (board, server) = duplex(8192);
    let peer: SocketAddr = "10.0.0.5:1234".parse().unwrap();
    let task = tokio::spawn(proxy::run_board(Box::new(server), peer, relay));
    (board, task)
}

async fn recv_exact(board: &mut DuplexStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(WAIT, board.read_exact(&mut buf))
        .await
        .expect("board read timed out")
        .unwrap();
    buf
}

fn aaa_script(req: &[u8]) -> Option<Vec<u8>> {
    match req.first() {
        Some(0x01) => Some(vec![0x05, 0xc1, 0xc2, 0xc3]),
        Some(0x07) => Some(vec![0x08, 0x01]),
        _ => None,
    }
}

fn att_script(req: &[u8]) -> Option<Vec<u8>> {
    match req.first() {
        Some(0x07) => Some(vec![0x08, 0xaa]),
        Some(0x04) => Some(vec![0x08, 0xbb]),
        _ => None,
    }
}

#[tokio::test]
async fn mud_claim_gets_challenge_unmodified() {
    let (aaa, mut aaa_seen) = mock_backend(aaa_script).await;
    let relay = context(aaa, free_addr().await, free_addr().await, Duration::from_secs(10));
    let (mut board, task) = spawn_board(Arc::clone(&relay));

    board.write_all(&[0x01, 0x00, 0x03, b'm', b'u', b'd']).await.unwrap();
    assert_eq!(recv_exact(&mut board, 4).await, [0x05, 0xc1, 0xc2, 0xc3]);
    assert_eq!(aaa_seen.recv().await.unwrap(), [0x01, 0x00, 0x03, b'm', b'u', b'd']);

    drop(board);
    task.await.unwrap().unwrap();
    assert_eq!(
        relay.metrics.relay_forwards.get(&[("leg", "board"), ("kind", "mud_claim")]),
        1
    );
}

#[tokio::test]
async fn non_matching_backend_reply_is_dropped() {
    let (aaa, mut aaa_seen) = mock_backend(|_| Some(vec![0x09, 0x00])).await;
    let relay = context(aaa, free_addr().await, free_addr().await, Duration::from_secs(10));
    let (mut board, task) = spawn_board(relay);

    board.write_all(&[0x01, 0x00]).await.unwrap();
    assert_eq!(aaa_seen.recv().await.unwrap(), [0x01, 0x00]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the first bytes the board sees are its own hello, not the 0x09 reply
    board.write_all(b"Hello").await.unwrap();
    assert_eq!(recv_exact(&mut board, 5).await, b"Hello");

    drop(board);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn claim_containing_hello_is_echoed_and_still_forwarded() {
    let (aaa, mut aaa_seen) = mock_backend(|_| Some(vec![0x05, 0xaa])).await;
    let relay = context(aaa, free_addr().await, free_addr().await, Duration::from_secs(10));
    let (mut board, task) = spawn_board(relay);

    let mut claim = vec![0x01, 0x00, 0x12];
    claim.extend_from_slice(b"https://Hello.mud/");
    board.write_all(&claim).await.unwrap();

    assert_eq!(recv_exact(&mut board, claim.len()).await, claim);
    assert_eq!(recv_exact(&mut board, 2).await, [0x05, 0xaa]);
    assert_eq!(aaa_seen.recv().await.unwrap(), claim);

    drop(board);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn hello_is_echoed() {
    let relay = context(free_addr().await, free_addr().await, free_addr().await, Duration::from_secs(10));
    let (mut board, task) = spawn_board(relay);

    board.write_all(&[0xee, 0x01]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    board.write_all(b"Hello proxy").await.unwrap();
    assert_eq!(recv_exact(&mut board, 11).await, b"Hello proxy");

    drop(board);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn unreachable_backend_answers_ko() {
    let relay = context(free_addr().await, free_addr().await, free_addr().await, Duration::from_secs(10));
    let (mut board, task) = spawn_board(Arc::clone(&relay));

    board.write_all(&[0x01, 0x00]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 2).await, b"KO");
    assert_eq!(relay.metrics.nacks.get(&[("reason", "backend")]), 1);

    drop(board);
    task.await.unwrap().unwrap();
}

async fn connect_with_retry(addr: SocketAddr) -> TcpStream {
    for _ in 0..100 {
        if let Ok(s) = TcpStream::connect(addr).await {
            return s;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("reconfiguration listener never came up on {addr}");
}

#[tokio::test]
async fn verdict_starts_reconfiguration_listener() {
    let (aaa, _seen) = mock_backend(aaa_script).await;
    let reconf = free_addr().await;
    let relay = context(aaa, free_addr().await, reconf, Duration::from_secs(10));
    let (mut board, task) = spawn_board(Arc::clone(&relay));

    board.write_all(&[0x07, 0x51, 0x52]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 2).await, [0x08, 0x01]);

    let mut push = connect_with_retry(reconf).await;
    push.write_all(&[0x02, 0x02, 0x00, 0x01, 0x07]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 5).await, [0x02, 0x02, 0x00, 0x01, 0x07]);

    // unknown push types stay with the proxy
    push.write_all(&[0x03, 0x00]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    push.write_all(&[0x01, 0x10]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 2).await, [0x01, 0x10]);

    relay.shutdown.cancel();
    drop(board);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn board_disconnect_releases_reconfiguration_port() {
    let (aaa, _seen) = mock_backend(aaa_script).await;
    let reconf = free_addr().await;
    let relay = context(aaa, free_addr().await, reconf, Duration::from_secs(10));
    let (mut board, task) = spawn_board(Arc::clone(&relay));

    board.write_all(&[0x07, 0x51, 0x52]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 2).await, [0x08, 0x01]);
    let _push = connect_with_retry(reconf).await;

    board.shutdown().await.unwrap();
    task.await.unwrap().unwrap();

    // the server side of the board socket is closed, not left half-open
    let mut rest = Vec::new();
    tokio::time::timeout(WAIT, board.read_to_end(&mut rest))
        .await
        .expect("board socket left open")
        .unwrap();
    assert!(rest.is_empty());

    // the next board can bind the push port
    let mut rebound = None;
    for _ in 0..100 {
        if let Ok(l) = TcpListener::bind(reconf).await {
            rebound = Some(l);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(rebound.is_some(), "reconfiguration port still bound");
}

#[tokio::test]
async fn reconfiguration_ack_enters_attestation() {
    let (aaa, mut aaa_seen) = mock_backend(aaa_script).await;
    let (att, mut att_seen) = mock_backend(att_script).await;
    let relay = context(aaa, att, free_addr().await, Duration::from_secs(10));
    let (mut board, task) = spawn_board(relay);

    board.write_all(&[0x02, 0x4f, 0x4b]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 9).await, ATT_START);
    assert_eq!(aaa_seen.recv().await.unwrap(), [0x02, 0x4f, 0x4b]);

    board.write_all(&[0x07, 0x99]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 2).await, [0x08, 0xaa]);
    assert_eq!(recv_exact(&mut board, 9).await, ATT_DONE);
    assert_eq!(att_seen.recv().await.unwrap(), [0x07, 0x99]);

    board.write_all(&[0x04, 0x01, 0x02]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 2).await, [0x08, 0xbb]);

    // a MUD claim now is an unknown attestation frame
    board.write_all(&[0x01]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    board.write_all(&[0x04]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 2).await, [0x08, 0xbb]);

    drop(board);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn armed_clock_probes_periodically() {
    let (aaa, _a) = mock_backend(aaa_script).await;
    let (att, _b) = mock_backend(att_script).await;
    let relay = context(aaa, att, free_addr().await, Duration::from_millis(100));
    let (mut board, task) = spawn_board(relay);

    board.write_all(&[0x02]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 9).await, ATT_START);

    // no probe before the first signature+random verdict
    let mut early = [0u8; 1];
    assert!(tokio::time::timeout(Duration::from_millis(300), board.read(&mut early))
        .await
        .is_err());

    board.write_all(&[0x07]).await.unwrap();
    assert_eq!(recv_exact(&mut board, 2).await, [0x08, 0xaa]);
    assert_eq!(recv_exact(&mut board, 9).await, ATT_DONE);
    assert_eq!(recv_exact(&mut board, 9).await, ATT_DONE);
    assert_eq!(recv_exact(&mut board, 9).await, ATT_DONE);

    drop(board);
    task.await.unwrap().unwrap();
}
