//! Lifecycle of one admitted connection.
//!
//! A connection carries exactly one request. The task decodes it, runs the
//! matching blocking stack operation, writes the reply and closes. Three
//! things cancel it early, all through the connector's cancellation token:
//! eviction by the registry, the peer closing its end, and server shutdown.
//! A canceled connection is closed without a reply.

use std::sync::Arc;

use stackserver_core::protocol::{self, BUSY, PUSH_ACK};
use stackserver_core::{
    Connector, Coordinator, CoordinatorError, Payload, Registry, Released, Request,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::ConnectionError;

/// How a connection ended, when it ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload stored, acknowledgment written
    Pushed { len: usize },
    /// Payload removed and written back
    Popped { len: usize },
    /// Canceled before a reply; nothing was written
    Canceled,
}

/// Releases the connector from the registry when the task ends, however it
/// ends.
struct ReleaseGuard {
    registry: Arc<Registry>,
    connector: Connector,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        match self.registry.release(&self.connector) {
            Ok(Released::Removed) => debug!("Released from registry"),
            Ok(Released::AlreadyReleased) => debug!("Already evicted from registry"),
            Err(e) => error!(error = %e, "Registry release failed"),
        }
    }
}

/// Serve one admitted connection to completion.
///
/// The connector is released from `registry` on every exit path, including
/// panics.
pub async fn serve_connection(
    stream: TcpStream,
    connector: Connector,
    registry: Arc<Registry>,
    coordinator: Arc<Coordinator>,
) -> Result<Outcome, ConnectionError> {
    let _release = ReleaseGuard {
        registry,
        connector: connector.clone(),
    };

    let result = serve(stream, &connector, &coordinator).await;
    match &result {
        Ok(Outcome::Pushed { len }) => info!(len = *len, "push() completed"),
        Ok(Outcome::Popped { len }) => info!(len = *len, "pop() completed"),
        Ok(Outcome::Canceled) => info!(
            age_ms = connector.age().as_millis() as u64,
            "Operation canceled, closing without reply"
        ),
        Err(ConnectionError::Protocol(e)) => {
            warn!(error = %e, "Protocol violation, closing without reply")
        }
        Err(e) => warn!(error = %e, "Connection failed"),
    }
    result
}

async fn serve(
    mut stream: TcpStream,
    connector: &Connector,
    coordinator: &Coordinator,
) -> Result<Outcome, ConnectionError> {
    let cancel = connector.cancellation();

    let request = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(Outcome::Canceled),
        request = protocol::read_request(&mut stream) => request?,
    };
    debug!(opcode = ?request.opcode(), "Request decoded");

    let (reader, mut writer) = stream.into_split();
    // Detached: it exits on its own once the token is cancelled at release.
    let _watchdog: JoinHandle<()> = spawn_watchdog(reader, cancel.clone());

    let (reply, outcome) = match request {
        Request::Push(payload) => {
            let len = payload.len();
            match coordinator.blocking_push(cancel, payload).await {
                Ok(()) => (Reply::Ack, Outcome::Pushed { len }),
                Err(CoordinatorError::Canceled) => return Ok(Outcome::Canceled),
                Err(e) => return Err(e.into()),
            }
        }
        Request::Pop => match coordinator.blocking_pop(cancel).await {
            Ok(payload) => {
                let len = payload.len();
                (Reply::Payload(payload), Outcome::Popped { len })
            }
            Err(CoordinatorError::Canceled) => return Ok(Outcome::Canceled),
            Err(e) => return Err(e.into()),
        },
    };

    if let Err(e) = writer.write_all(reply.as_bytes()).await {
        if let Reply::Payload(payload) = &reply {
            warn!(payload = ?payload, "Popped payload could not be delivered");
        }
        return Err(e.into());
    }
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Write shutdown failed after reply");
    }

    Ok(outcome)
}

enum Reply {
    Ack,
    Payload(Payload),
}

impl Reply {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Ack => &[PUSH_ACK],
            Self::Payload(payload) => payload.as_bytes(),
        }
    }
}

/// Watch the read half for the peer going away while the operation blocks.
///
/// The request has already been read, so any further read outcome (end of
/// stream, stray bytes or an error) ends the connection.
fn spawn_watchdog(mut reader: OwnedReadHalf, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut buf = [0u8; 1];
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = reader.read(&mut buf) => {
                    match result {
                        Ok(0) => debug!("Peer closed connection"),
                        Ok(_) => debug!("Unexpected bytes after request"),
                        Err(e) => debug!(error = %e, "Watchdog read failed"),
                    }
                    cancel.cancel();
                }
            }
        }
        .in_current_span(),
    )
}

/// Reply busy to a connection that was refused admission, then close it.
pub async fn send_busy(mut stream: TcpStream) -> std::io::Result<()> {
    stream.write_all(&[BUSY]).await?;
    stream.shutdown().await
}
