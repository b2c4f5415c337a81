use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

/// Unique id of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClientId(u64);

impl ClientId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Lifecycle of a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepted and registered, preamble not yet written
    Registered,
    /// Preamble written, frames flowing
    Streaming,
    /// Session loop has exited
    Terminated,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Registered,
            1 => SessionState::Streaming,
            _ => SessionState::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Registered => 0,
            SessionState::Streaming => 1,
            SessionState::Terminated => 2,
        }
    }
}

struct HandleInner {
    id: ClientId,
    peer_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    state: AtomicU8,
    frames_sent: AtomicU64,
    shutdown: watch::Sender<bool>,
}

/// Shared handle to one live connection
///
/// The socket itself stays with the session; the handle carries what other
/// tasks need: identity, liveness and a way to ask the session to stop.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<HandleInner>,
}

impl ClientHandle {
    /// Create a handle and the receiver its session listens on for termination
    pub fn new(peer_addr: SocketAddr) -> (Self, watch::Receiver<bool>) {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = Self {
            inner: Arc::new(HandleInner {
                id: ClientId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
                peer_addr,
                connected_at: Utc::now(),
                state: AtomicU8::new(SessionState::Registered.as_u8()),
                frames_sent: AtomicU64::new(0),
                shutdown,
            }),
        };
        (handle, shutdown_rx)
    }

    pub fn id(&self) -> ClientId {
        self.inner.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.inner.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.state() != SessionState::Terminated
    }

    pub fn frames_sent(&self) -> u64 {
        self.inner.frames_sent.load(Ordering::Relaxed)
    }

    pub(crate) fn record_frame(&self) {
        self.inner.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Ask the session to stop at its next suspension point
    pub fn terminate(&self) {
        self.inner.shutdown.send_replace(true);
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id(),
            peer_addr: self.peer_addr(),
            connected_at: self.inner.connected_at,
            state: self.state(),
            frames_sent: self.frames_sent(),
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id())
            .field("peer_addr", &self.peer_addr())
            .field("state", &self.state())
            .finish()
    }
}

/// Point-in-time view of a connected client
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub peer_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub state: SessionState,
    pub frames_sent: u64,
}

/// Thread-safe set of live client handles
///
/// Every operation takes the same lock, so counts and snapshots never
/// observe a half-applied add or remove.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<Vec<ClientHandle>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle, returning the new total
    pub fn add(&self, handle: ClientHandle) -> usize {
        let mut clients = self.clients.lock();
        if !clients.iter().any(|c| c.id() == handle.id()) {
            clients.push(handle);
        }
        clients.len()
    }

    /// Add a handle only while below `limit`, returning the new total
    pub fn try_add(&self, handle: ClientHandle, limit: Option<usize>) -> Option<usize> {
        let mut clients = self.clients.lock();
        if let Some(limit) = limit {
            if clients.len() >= limit {
                return None;
            }
        }
        if !clients.iter().any(|c| c.id() == handle.id()) {
            clients.push(handle);
        }
        Some(clients.len())
    }

    /// Remove a handle; absent handles are ignored
    ///
    /// Returns whether the handle was present.
    pub fn remove(&self, id: ClientId) -> bool {
        let mut clients = self.clients.lock();
        match clients.iter().position(|c| c.id() == id) {
            Some(idx) => {
                clients.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.lock().iter().any(|c| c.id() == id)
    }

    /// Copy of the current handles
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.clients.lock().clone()
    }

    /// Remove and return every handle
    pub fn drain(&self) -> Vec<ClientHandle> {
        std::mem::take(&mut *self.clients.lock())
    }

    /// Register a handle for the lifetime of the returned guard
    pub fn register(&self, handle: ClientHandle) -> ClientGuard {
        self.add(handle.clone());
        ClientGuard {
            registry: self.clone(),
            handle,
        }
    }
}

/// Keeps a client registered until dropped
pub struct ClientGuard {
    registry: ClientRegistry,
    handle: ClientHandle,
}

impl ClientGuard {
    /// Wrap a handle that is already in `registry`
    pub fn adopt(registry: &ClientRegistry, handle: ClientHandle) -> Self {
        Self {
            registry: registry.clone(),
            handle,
        }
    }

    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.handle.set_state(SessionState::Terminated);
        if self.registry.remove(self.handle.id()) {
            tracing::info!(
                "Client {} ({}) disconnected. Total clients: {}",
                self.handle.id(),
                self.handle.peer_addr(),
                self.registry.count()
            );
        }
    }
}
