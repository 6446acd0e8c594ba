//! tests/common/harness.rs
use kestrel_quic::{Listener, QuicSocket, Stream};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Once;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "kestrel_quic=info".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A server socket on an ephemeral loopback port.
pub struct TestHarness {
    pub server_addr: SocketAddr,
    pub server_listener: Listener,
    pub server_socket: QuicSocket,
}

impl TestHarness {
    pub async fn new() -> Self {
        init_tracing();
        let (server_socket, server_listener) = QuicSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        Self {
            server_addr: server_socket.local_addr(),
            server_listener,
            server_socket,
        }
    }

    /// Creates a new client socket bound to a random available port.
    pub async fn create_client() -> QuicSocket {
        let (client_socket, _) = QuicSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        client_socket
    }
}

/// Deterministic test payload.
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Reads exactly `len` bytes from the stream and returns their digest.
pub async fn read_digest(stream: &mut Stream, len: usize) -> [u8; 32] {
    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .expect("failed to read payload");
    sha256(&buf)
}

/// Writes `data` and then finishes the stream gracefully.
pub async fn write_and_finish(stream: &mut Stream, data: &[u8]) {
    stream.write_all(data).await.expect("failed to write payload");
    stream.shutdown().await.expect("failed to finish stream");
}

/// Echoes `len` bytes back to the peer.
pub async fn echo_server_handler(mut stream: Stream, remote_addr: SocketAddr, len: usize) {
    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .expect("server handler failed to read");
    tracing::info!(%remote_addr, len, "echoing payload");
    stream
        .write_all(&buf)
        .await
        .expect("server handler failed to echo data");
    stream
        .shutdown()
        .await
        .expect("server handler failed to finish");
}
