//! Best-effort UDP log sink.
//!
//! Every formatted event becomes one datagram prefixed with `[StackServer] `.
//! Sends are non-blocking and failures are dropped; a missing listener on
//! the other end must never slow down or break the server.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;

/// Prefix carried by every diagnostic datagram.
pub const DATAGRAM_PREFIX: &[u8] = b"[StackServer] ";

/// A connected, non-blocking UDP socket that log events are written to.
#[derive(Debug, Clone)]
pub struct UdpSink {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

impl UdpSink {
    /// Open a sink towards `host:port`.
    ///
    /// Returns `Ok(None)` when `port` is zero, which disables the sink.
    ///
    /// # Errors
    ///
    /// Fails if `host` does not resolve or the local socket cannot be set up.
    pub fn connect(host: &str, port: u16) -> io::Result<Option<Self>> {
        if port == 0 {
            return Ok(None);
        }

        let target = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("diagnostics host {host} did not resolve"),
            )
        })?;
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)?;
        socket.connect(target)?;
        socket.set_nonblocking(true)?;

        Ok(Some(Self {
            socket: Arc::new(socket),
            target,
        }))
    }

    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl<'a> MakeWriter<'a> for UdpSink {
    type Writer = Datagram;

    fn make_writer(&'a self) -> Self::Writer {
        Datagram {
            socket: Arc::clone(&self.socket),
            buf: DATAGRAM_PREFIX.to_vec(),
        }
    }
}

/// Buffers one formatted event and sends it when dropped.
pub struct Datagram {
    socket: Arc<UdpSocket>,
    buf: Vec<u8>,
}

impl Datagram {
    fn send(&mut self) {
        if self.buf.len() <= DATAGRAM_PREFIX.len() {
            return;
        }
        while self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        let _ = self.socket.send(&self.buf);
        self.buf.truncate(DATAGRAM_PREFIX.len());
    }
}

impl io::Write for Datagram {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send();
        Ok(())
    }
}

impl Drop for Datagram {
    fn drop(&mut self) {
        self.send();
    }
}
