//! Listener, admission and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stackserver_core::{Coordinator, Registry, RegistryError, ServerConfig, SocketHandle};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::connection::{self, send_busy};
use crate::error::{ServerError, ServerResult};
use crate::lifecycle::{ConnectionTracker, DrainResult};

/// A configured server that has not bound its listener yet.
///
/// The registry and the coordinator are shared with every connection task
/// and exposed for inspection.
#[derive(Debug)]
pub struct StackServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    coordinator: Arc<Coordinator>,
}

impl StackServer {
    /// Validate `config` and build the shared state.
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] if a limit is zero.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(Registry::new(
                config.max_connections,
                config.max_connection_age,
            )),
            coordinator: Arc::new(Coordinator::new(config.stack_capacity)),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the address is unavailable.
    pub async fn bind(self) -> ServerResult<BoundServer> {
        let addr = self.config.bind_target();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        info!(
            addr = %listener.local_addr()?,
            max_connections = self.config.max_connections,
            stack_capacity = self.config.stack_capacity,
            max_age_secs = self.config.max_connection_age.as_secs_f64(),
            tcp_nodelay = self.config.tcp_nodelay,
            tcp_keepalive_secs = self.config.tcp_keepalive_secs,
            "StackServer listening"
        );

        Ok(BoundServer {
            server: self,
            listener,
            tracker: ConnectionTracker::new(),
        })
    }
}

/// A server with a bound listener, ready to [`run`](Self::run).
#[derive(Debug)]
pub struct BoundServer {
    server: StackServer,
    listener: TcpListener,
    tracker: ConnectionTracker,
}

impl BoundServer {
    /// Address the listener actually bound. Useful with port `0`.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        self.server.registry()
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        self.server.coordinator()
    }

    /// Number of connection tasks still running.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.count()
    }

    /// Accept connections until `shutdown` fires, then cancel every
    /// registered connection and wait for their tasks to finish.
    pub async fn run(self, shutdown: CancellationToken) -> DrainResult {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping accept loop");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        // Back off on fd exhaustion instead of spinning.
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        drop(self.listener);
        let cancelled = self.server.registry.cancel_all();
        info!(
            cancelled,
            active_connections = self.tracker.count(),
            drain_timeout_secs = self.server.config.drain_timeout.as_secs(),
            "Draining connections"
        );

        let result = self.tracker.drain(self.server.config.drain_timeout).await;
        match &result {
            DrainResult::Complete => info!("All connections drained"),
            DrainResult::Timeout { remaining } => {
                warn!(remaining = *remaining, "Drain timed out with connections still open")
            }
        }
        result
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = configure_tcp_stream(&stream, &self.server.config) {
            warn!(peer = %peer, error = %e, "Failed to configure TCP options");
        }

        let handle = match SocketHandle::from_stream(&stream) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(
                    peer = %peer,
                    error = %e,
                    "Could not duplicate socket, eviction will only cancel the task"
                );
                None
            }
        };

        let connector = match self.server.registry.admit(handle) {
            Ok(connector) => connector,
            Err(RegistryError::AdmissionRejected { max }) => {
                warn!(
                    peer = %peer,
                    max_connections = max,
                    "Connection limit reached, replying busy"
                );
                tokio::spawn(async move {
                    if let Err(e) = send_busy(stream).await {
                        debug!(peer = %peer, error = %e, "Failed to send busy reply");
                    }
                });
                return;
            }
            Err(e) => {
                error!(peer = %peer, error = %e, "Admission failed");
                return;
            }
        };

        let span = info_span!("conn", id = %connector.id(), peer = %peer);
        span.in_scope(|| {
            info!(
                registered = self.server.registry.len(),
                "Connection accepted"
            )
        });

        let guard = self.tracker.track();
        let registry = Arc::clone(&self.server.registry);
        let coordinator = Arc::clone(&self.server.coordinator);
        tokio::spawn(
            async move {
                let _guard = guard;
                let _ = connection::serve_connection(stream, connector, registry, coordinator).await;
            }
            .instrument(span),
        );
    }
}

/// Apply per-socket TCP options to an accepted stream.
fn configure_tcp_stream(stream: &TcpStream, config: &ServerConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    if config.tcp_keepalive_secs > 0 {
        let socket = socket2::SockRef::from(stream);
        let keepalive =
            socket2::TcpKeepalive::new().with_time(Duration::from_secs(config.tcp_keepalive_secs));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}
