//! End-to-end tests against a live server on loopback.

mod helpers;

use std::time::Duration;

use helpers::{TestServer, pop, push, read_reply, request, send, wait_until};
use stackserver::DrainResult;
use tokio::io::AsyncWriteExt;

const LONG_AGE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_push_then_pop() {
    let server = TestServer::start(10, 10, LONG_AGE).await;

    assert_eq!(request(server.addr, &[0x02, 0xAA, 0xBB]).await, vec![0x00]);
    assert_eq!(server.coordinator.depth(), 1);

    assert_eq!(pop(server.addr).await, vec![0xAA, 0xBB]);
    assert_eq!(server.coordinator.depth(), 0);

    assert!(wait_until(Duration::from_secs(1), || server.registry.is_empty()).await);
    assert_eq!(server.stop().await, DrainResult::Complete);
}

#[tokio::test]
async fn test_lifo_order() {
    let server = TestServer::start(10, 10, LONG_AGE).await;

    assert_eq!(push(server.addr, b"A").await, vec![0x00]);
    assert_eq!(push(server.addr, b"B").await, vec![0x00]);

    assert_eq!(pop(server.addr).await, b"B");
    assert_eq!(pop(server.addr).await, b"A");
    server.stop().await;
}

#[tokio::test]
async fn test_zero_length_payload() {
    let server = TestServer::start(10, 10, LONG_AGE).await;

    assert_eq!(push(server.addr, b"").await, vec![0x00]);
    assert_eq!(server.coordinator.depth(), 1);

    assert!(pop(server.addr).await.is_empty());
    assert_eq!(server.coordinator.depth(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_pop_with_length_bits_set_is_pop() {
    let server = TestServer::start(10, 10, LONG_AGE).await;

    push(server.addr, b"z").await;
    assert_eq!(request(server.addr, &[0x85]).await, b"z");
    server.stop().await;
}

#[tokio::test]
async fn test_pop_on_empty_waits_for_push() {
    let server = TestServer::start(10, 10, LONG_AGE).await;
    let addr = server.addr;

    let popper = tokio::spawn(async move { pop(addr).await });
    assert!(wait_until(Duration::from_secs(1), || server.registry.len() == 1).await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!popper.is_finished(), "pop must be withheld on an empty stack");

    assert_eq!(push(addr, &[0x42]).await, vec![0x00]);

    let reply = tokio::time::timeout(Duration::from_secs(2), popper)
        .await
        .expect("pop should complete after push")
        .unwrap();
    assert_eq!(reply, vec![0x42]);
    assert_eq!(server.coordinator.depth(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_push_on_full_waits_for_pop() {
    let server = TestServer::start(10, 1, LONG_AGE).await;
    let addr = server.addr;

    assert_eq!(push(addr, b"X").await, vec![0x00]);

    let pusher = tokio::spawn(async move { push(addr, b"Y").await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pusher.is_finished(), "push must be withheld on a full stack");
    assert_eq!(server.coordinator.depth(), 1);

    assert_eq!(pop(addr).await, b"X");

    let ack = tokio::time::timeout(Duration::from_secs(2), pusher)
        .await
        .expect("push should complete after pop")
        .unwrap();
    assert_eq!(ack, vec![0x00]);
    assert_eq!(pop(addr).await, b"Y");
    server.stop().await;
}

#[tokio::test]
async fn test_busy_when_full_and_nothing_stale() {
    let server = TestServer::start(1, 10, LONG_AGE).await;

    let holder = send(server.addr, &[0x80]).await;
    assert!(wait_until(Duration::from_secs(1), || server.registry.len() == 1).await);
    let ids_before = server.registry.ids();

    assert_eq!(request(server.addr, &[]).await, vec![0xff]);

    assert_eq!(server.registry.ids(), ids_before);
    assert_eq!(server.registry.len(), 1);

    drop(holder);
    server.stop().await;
}

#[tokio::test]
async fn test_stale_connection_evicted_for_newcomer() {
    let server = TestServer::start(1, 10, Duration::from_millis(200)).await;

    let stale = send(server.addr, &[0x80]).await;
    assert!(wait_until(Duration::from_secs(1), || server.registry.len() == 1).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Admitting the newcomer evicts the blocked popper.
    assert_eq!(push(server.addr, &[0x42]).await, vec![0x00]);

    assert!(read_reply(stale).await.is_empty());
    assert_eq!(server.coordinator.depth(), 1);
    assert_eq!(pop(server.addr).await, vec![0x42]);
    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_while_blocked_releases_entry() {
    let server = TestServer::start(10, 10, LONG_AGE).await;

    let popper = send(server.addr, &[0x80]).await;
    assert!(wait_until(Duration::from_secs(1), || server.registry.len() == 1).await);
    drop(popper);
    assert!(wait_until(Duration::from_secs(2), || server.registry.is_empty()).await);

    // The abandoned pop must not swallow this payload.
    assert_eq!(push(server.addr, &[0x11]).await, vec![0x00]);
    assert_eq!(server.coordinator.depth(), 1);
    assert_eq!(pop(server.addr).await, vec![0x11]);
    server.stop().await;
}

#[tokio::test]
async fn test_truncated_push_gets_no_reply() {
    let server = TestServer::start(10, 10, LONG_AGE).await;

    let mut stream = send(server.addr, &[0x05, 0x01, 0x02]).await;
    stream.shutdown().await.unwrap();

    assert!(read_reply(stream).await.is_empty());
    assert_eq!(server.coordinator.depth(), 0);
    assert!(wait_until(Duration::from_secs(1), || server.registry.is_empty()).await);
    server.stop().await;
}

#[tokio::test]
async fn test_surplus_bytes_are_dropped() {
    let server = TestServer::start(10, 10, LONG_AGE).await;

    assert_eq!(
        request(server.addr, &[0x01, 0xAA, 0xBB, 0xCC]).await,
        vec![0x00]
    );
    assert_eq!(pop(server.addr).await, vec![0xAA]);
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_cancels_blocked_connections() {
    let server = TestServer::start(10, 10, LONG_AGE).await;

    let poppers: Vec<_> = connect_poppers(server.addr, 3).await;
    assert!(wait_until(Duration::from_secs(1), || server.registry.len() == 3).await);

    let registry = std::sync::Arc::clone(&server.registry);
    assert_eq!(server.stop().await, DrainResult::Complete);
    assert!(registry.is_empty());

    for popper in poppers {
        assert!(read_reply(popper).await.is_empty());
    }
}

async fn connect_poppers(
    addr: std::net::SocketAddr,
    count: usize,
) -> Vec<tokio::net::TcpStream> {
    let mut streams = Vec::with_capacity(count);
    for _ in 0..count {
        streams.push(send(addr, &[0x80]).await);
    }
    streams
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_conserve_payloads() {
    let server = TestServer::start(100, 5, LONG_AGE).await;
    let addr = server.addr;

    let pushers: Vec<_> = (0..20u8)
        .map(|i| tokio::spawn(async move { push(addr, &[i]).await }))
        .collect();
    let poppers: Vec<_> = (0..20)
        .map(|_| tokio::spawn(async move { pop(addr).await }))
        .collect();

    for pusher in pushers {
        assert_eq!(pusher.await.unwrap(), vec![0x00]);
    }
    let mut popped: Vec<u8> = Vec::new();
    for popper in poppers {
        let reply = popper.await.unwrap();
        assert_eq!(reply.len(), 1);
        popped.push(reply[0]);
    }
    popped.sort_unstable();

    assert_eq!(popped, (0..20u8).collect::<Vec<_>>());
    assert_eq!(server.coordinator.depth(), 0);
    server.stop().await;
}
