//! Bounded connection registry with age-based eviction.
//!
//! The registry tracks every admitted connection in admission order. When it
//! is full, a new connection can only get in by evicting the single oldest
//! entry, and only if that entry has been alive longer than the configured
//! eviction age. Otherwise the caller must reply busy and close the socket.
//!
//! ## Layout
//!
//! Entries live in a [`Slab`] arena and are threaded into a doubly-linked
//! list by slab index:
//!
//! ```text
//! head (oldest) ⇄ … ⇄ tail (newest)
//! ```
//!
//! A [`Connector`] handed to the connection task is a lightweight handle:
//! its id, its slot index and a clone of its cancellation token. Slots are
//! reused after release, so every lookup checks the id stored in the slot
//! before touching it.

use std::fmt;
use std::io;
use std::net::Shutdown;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slab::Slab;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RegistryError;

/// Unique, monotonically increasing connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Out-of-band handle used to force a connection's socket closed.
///
/// The connection task owns the actual stream. This is a duplicated
/// descriptor for the same socket; shutting it down makes every pending read
/// on the task side return end-of-stream.
pub struct SocketHandle {
    socket: socket2::Socket,
}

impl SocketHandle {
    /// Duplicate the descriptor of a tokio TCP stream.
    pub fn from_stream(stream: &tokio::net::TcpStream) -> io::Result<Self> {
        let socket = socket2::SockRef::from(stream).try_clone()?;
        Ok(Self { socket })
    }

    fn shutdown(&self) {
        match self.socket.shutdown(Shutdown::Both) {
            Ok(()) => {}
            // Peer already gone; nothing left to close.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => debug!(error = %e, "Socket shutdown failed"),
        }
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle")
            .field("peer", &self.socket.peer_addr().ok().and_then(|a| a.as_socket()))
            .finish()
    }
}

/// A registered connection, as seen by the task serving it.
///
/// Cloning is cheap. The registry keeps the owning entry; dropping a
/// `Connector` does not release it (see [`Registry::release`]).
#[derive(Debug, Clone)]
pub struct Connector {
    id: ConnectionId,
    slot: usize,
    admitted_at: Instant,
    cancel: CancellationToken,
}

impl Connector {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Time since admission.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.admitted_at.elapsed()
    }

    /// The cancellation signal raised on release, eviction or peer close.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Raise the cancellation signal. Safe to call any number of times.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Result of a successful [`Registry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// The connector was linked and has now been removed.
    Removed,
    /// The connector had already been released or evicted.
    AlreadyReleased,
}

struct Entry {
    id: ConnectionId,
    admitted_at: Instant,
    cancel: CancellationToken,
    socket: Option<SocketHandle>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Entry {
    /// Close the socket and raise cancellation. The entry must already be
    /// unlinked.
    fn finish(self) {
        if let Some(socket) = &self.socket {
            socket.shutdown();
        }
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct Links {
    slots: Slab<Entry>,
    head: Option<usize>,
    tail: Option<usize>,
    live: usize,
}

impl Links {
    fn push_back(&mut self, mut entry: Entry) -> usize {
        entry.prev = self.tail;
        entry.next = None;
        let key = self.slots.insert(entry);
        match self.tail {
            Some(tail) => self.slots[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        key
    }

    fn unlink(&mut self, key: usize) -> Entry {
        let entry = self.slots.remove(key);
        match entry.prev {
            Some(prev) => self.slots[prev].next = entry.next,
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => self.slots[next].prev = entry.prev,
            None => self.tail = entry.prev,
        }
        entry
    }

    fn is_linked(&self, key: usize, id: ConnectionId) -> bool {
        self.slots.get(key).is_some_and(|entry| entry.id == id)
    }
}

/// Bounded, admission-ordered collection of live connections.
pub struct Registry {
    links: Mutex<Links>,
    max: usize,
    max_age: Duration,
    next_id: AtomicU64,
}

impl Registry {
    /// Create a registry admitting at most `max` connections. When full, the
    /// oldest entry becomes evictable once it is older than `max_age`.
    #[must_use]
    pub fn new(max: usize, max_age: Duration) -> Self {
        Self {
            links: Mutex::new(Links::default()),
            max,
            max_age,
            next_id: AtomicU64::new(1),
        }
    }

    /// Admit a new connection.
    ///
    /// At capacity, the oldest entry is evicted (socket shut down,
    /// cancellation raised, unlinked) if its age exceeds the eviction
    /// threshold. Only that one entry is ever considered.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AdmissionRejected`] when full and nothing is old
    /// enough to evict. Nothing is registered in that case.
    pub fn admit(&self, socket: Option<SocketHandle>) -> Result<Connector, RegistryError> {
        let mut links = self.links.lock();

        if links.live >= self.max {
            let oldest = links
                .head
                .filter(|&key| links.slots[key].admitted_at.elapsed() > self.max_age)
                .ok_or(RegistryError::AdmissionRejected { max: self.max })?;

            let evicted = links.unlink(oldest);
            links.live -= 1;
            warn!(
                conn_id = %evicted.id,
                age_ms = evicted.admitted_at.elapsed().as_millis() as u64,
                max_age_ms = self.max_age.as_millis() as u64,
                "Evicting oldest connection to admit a new one"
            );
            evicted.finish();
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let admitted_at = Instant::now();
        let cancel = CancellationToken::new();
        let slot = links.push_back(Entry {
            id,
            admitted_at,
            cancel: cancel.clone(),
            socket,
            prev: None,
            next: None,
        });
        links.live += 1;

        Ok(Connector {
            id,
            slot,
            admitted_at,
            cancel,
        })
    }

    /// Release a connector. Idempotent.
    ///
    /// A linked connector is unlinked, its socket shut down and its
    /// cancellation raised. Releasing an already-released connector is a
    /// no-op reported as [`Released::AlreadyReleased`].
    ///
    /// # Errors
    ///
    /// [`RegistryError::RegistryUnderflow`] if a linked entry is found while
    /// the live count is zero.
    pub fn release(&self, connector: &Connector) -> Result<Released, RegistryError> {
        let mut links = self.links.lock();

        if !links.is_linked(connector.slot, connector.id) {
            return Ok(Released::AlreadyReleased);
        }

        links.live = links
            .live
            .checked_sub(1)
            .ok_or(RegistryError::RegistryUnderflow)?;
        let entry = links.unlink(connector.slot);
        drop(links);

        entry.finish();
        Ok(Released::Removed)
    }

    /// Raise cancellation on every live connector without unlinking them.
    ///
    /// Used during shutdown: each connection task notices, stops, and
    /// releases itself. Returns the number of connectors signalled.
    pub fn cancel_all(&self) -> usize {
        let links = self.links.lock();
        for (_, entry) in links.slots.iter() {
            entry.cancel.cancel();
        }
        links.live
    }

    /// Whether `connector` is still registered.
    #[must_use]
    pub fn contains(&self, connector: &Connector) -> bool {
        self.links.lock().is_linked(connector.slot, connector.id)
    }

    /// Live connection ids, oldest first.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        let links = self.links.lock();
        let mut ids = Vec::with_capacity(links.live);
        let mut cursor = links.head;
        while let Some(key) = cursor {
            let entry = &links.slots[key];
            ids.push(entry.id);
            cursor = entry.next;
        }
        ids
    }

    /// Age of the oldest live connection, if any.
    #[must_use]
    pub fn oldest_age(&self) -> Option<Duration> {
        let links = self.links.lock();
        links.head.map(|key| links.slots[key].admitted_at.elapsed())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.lock().live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .field("max", &self.max)
            .field("max_age", &self.max_age)
            .finish()
    }
}
