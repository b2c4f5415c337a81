//! Listening socket and the accept loop that spawns one session per client

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::client::{ClientGuard, ClientHandle, ClientRegistry};
use crate::config::ServerConfig;
use crate::error::{Result, StreamError};
use crate::frame::FrameSource;
use crate::session::ClientSession;

/// Owns the listening socket
pub struct ConnectionAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ConnectionAcceptor {
    /// Bind and listen; failures are reported with the requested address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StreamError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next incoming connection
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }
}

/// Errors that concern a single pending connection, not the listener
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Accept loop state for one server run
pub(crate) struct AcceptLoop {
    pub(crate) acceptor: ConnectionAcceptor,
    pub(crate) registry: ClientRegistry,
    pub(crate) source: Arc<dyn FrameSource>,
    pub(crate) config: ServerConfig,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) running: Arc<AtomicBool>,
}

impl AcceptLoop {
    pub(crate) async fn run(mut self) {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                accepted = self.acceptor.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer, &mut sessions),
                    Err(e) if is_connection_error(&e) => {
                        debug!("Dropped pending connection: {}", e);
                    }
                    Err(e) => {
                        error!("Failed to accept client: {}", e);
                        break;
                    }
                },
            }
        }

        // Closing the listener frees the port before sessions wind down
        let local_addr = self.acceptor.local_addr();
        drop(self.acceptor);
        self.running.store(false, Ordering::SeqCst);

        for handle in self.registry.snapshot() {
            handle.terminate();
        }

        let grace = self.config.send_timeout;
        let drained = tokio::time::timeout(grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} sessions still running after {:?}, aborting them",
                sessions.len(),
                grace
            );
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}
        }

        self.registry.drain();
        info!("Stopped accepting clients on {}", local_addr);
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr, sessions: &mut JoinSet<()>) {
        let (handle, shutdown) = ClientHandle::new(peer);

        let Some(total) = self
            .registry
            .try_add(handle.clone(), self.config.max_clients)
        else {
            warn!(
                "Rejecting client {}: limit of {} clients reached",
                peer,
                self.config.max_clients.unwrap_or_default()
            );
            return;
        };

        info!("Client {} connected from {}. Total clients: {}", handle.id(), peer, total);

        let guard = ClientGuard::adopt(&self.registry, handle);
        let session = ClientSession::new(stream, guard, shutdown, self.source.open(), &self.config);
        sessions.spawn(async move {
            session.run().await;
        });
    }
}
