//! Test helpers for StackServer integration tests.
//!
//! Starts a real server on an ephemeral loopback port and talks to it with
//! raw sockets, one request per connection.

#![allow(dead_code)] // Not every test file uses every helper

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stackserver::{DrainResult, StackServer};
use stackserver_core::{Coordinator, Registry, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running server plus handles to its shared state.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    pub coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
    handle: JoinHandle<DrainResult>,
}

impl TestServer {
    /// Start a server with the given limits on `127.0.0.1:0`.
    pub async fn start(max_connections: usize, stack_capacity: usize, max_age: Duration) -> Self {
        Self::start_with(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_connections,
            stack_capacity,
            max_connection_age: max_age,
            drain_timeout: Duration::from_secs(2),
            ..ServerConfig::default()
        })
        .await
    }

    pub async fn start_with(config: ServerConfig) -> Self {
        let bound = StackServer::new(config).unwrap().bind().await.unwrap();
        let addr = bound.local_addr().unwrap();
        let registry = Arc::clone(bound.registry());
        let coordinator = Arc::clone(bound.coordinator());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(bound.run(shutdown.clone()));

        Self {
            addr,
            registry,
            coordinator,
            shutdown,
            handle,
        }
    }

    /// Trigger shutdown and wait for the drain to finish.
    pub async fn stop(self) -> DrainResult {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .unwrap()
    }
}

/// Connect and send `bytes` without reading the reply.
pub async fn send(addr: SocketAddr, bytes: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream
}

/// Read until the server closes the connection.
pub async fn read_reply(mut stream: TcpStream) -> Vec<u8> {
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("server did not close the connection")
        .unwrap();
    reply
}

/// One full exchange: send `bytes`, return everything the server writes.
pub async fn request(addr: SocketAddr, bytes: &[u8]) -> Vec<u8> {
    read_reply(send(addr, bytes).await).await
}

/// Push `payload` and return the reply.
pub async fn push(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(payload.len() as u8);
    bytes.extend_from_slice(payload);
    request(addr, &bytes).await
}

/// Pop and return the reply.
pub async fn pop(addr: SocketAddr) -> Vec<u8> {
    request(addr, &[0x80]).await
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
