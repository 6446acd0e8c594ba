//! Handshake and echo over real UDP sockets on the loopback interface.

pub mod common;

use bytes::Bytes;
use common::harness::{TestHarness, echo_server_handler, payload};
use futures::future::join_all;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_message_echo() {
    let mut harness = TestHarness::new().await;
    let client = TestHarness::create_client().await;

    let mut client_stream = client.connect(harness.server_addr).await.unwrap();
    let (mut server_stream, _) = harness.server_listener.accept().await.unwrap();

    for i in 0..20u8 {
        let message = Bytes::from(payload(100 + i as usize * 10, i));
        client_stream.send(message.clone()).await.unwrap();
        let received = timeout(WAIT, server_stream.recv()).await.unwrap().unwrap();
        assert_eq!(received, message);
        server_stream.send(received).await.unwrap();
        let echoed = timeout(WAIT, client_stream.recv()).await.unwrap().unwrap();
        assert_eq!(echoed, message);
    }

    client_stream.finish().await.unwrap();
    assert!(client_stream.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_clients() {
    const CLIENTS: usize = 5;
    const LEN: usize = 16 * 1024;

    let mut harness = TestHarness::new().await;
    let server_addr = harness.server_addr;
    let server = tokio::spawn(async move {
        for _ in 0..CLIENTS {
            let (stream, remote_addr) = harness.server_listener.accept().await.unwrap();
            tokio::spawn(echo_server_handler(stream, remote_addr, LEN));
        }
        harness
    });

    let clients = (0..CLIENTS).map(|id| async move {
        let socket = TestHarness::create_client().await;
        let mut stream = socket.connect(server_addr).await.unwrap();
        let data = payload(LEN, id as u8);
        stream.write_all(&data).await.unwrap();

        let mut echoed = vec![0u8; LEN];
        timeout(WAIT, stream.read_exact(&mut echoed))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, data);
        stream.shutdown().await.unwrap();
    });
    join_all(clients).await;

    let harness = timeout(WAIT, server).await.unwrap().unwrap();
    assert!(harness.server_socket.connection_count() <= CLIENTS);
}
