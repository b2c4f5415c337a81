use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::acceptor::{AcceptLoop, ConnectionAcceptor};
use crate::client::{ClientInfo, ClientRegistry};
use crate::config::ServerConfig;
use crate::error::{Result, StreamError};
use crate::frame::FrameSource;

struct RunningServer {
    local_addr: SocketAddr,
    config: ServerConfig,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

/// MJPEG streaming server
///
/// Each instance is independent; the frame source it was built with is shared
/// by every run and every session.
pub struct StreamingServer {
    source: Arc<dyn FrameSource>,
    registry: ClientRegistry,
    running: Arc<AtomicBool>,
    lifecycle: Mutex<Option<RunningServer>>,
}

impl StreamingServer {
    /// Create a stopped server serving frames from `source`
    pub fn new<S: FrameSource + 'static>(source: S) -> Self {
        Self::with_shared_source(Arc::new(source))
    }

    pub fn with_shared_source(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            registry: ClientRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(None),
        }
    }

    /// Bind, listen and start accepting clients
    ///
    /// Returns once the listening socket is ready, with the bound address.
    /// Bind failures are returned here and leave the server stopped.
    pub async fn start(&self, config: ServerConfig) -> Result<SocketAddr> {
        config.validate()?;

        let mut lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::SeqCst) {
            return Err(StreamError::AlreadyRunning);
        }

        // The accept loop may have ended on its own; finish tearing it down
        if let Some(previous) = lifecycle.take() {
            let _ = previous.accept_task.await;
        }
        self.registry.drain();

        let acceptor = ConnectionAcceptor::bind(config.bind_addr()).await?;
        let local_addr = acceptor.local_addr();

        let (shutdown, shutdown_rx) = watch::channel(false);
        self.running.store(true, Ordering::SeqCst);

        let accept_loop = AcceptLoop {
            acceptor,
            registry: self.registry.clone(),
            source: Arc::clone(&self.source),
            config: config.clone(),
            shutdown: shutdown_rx,
            running: Arc::clone(&self.running),
        };
        let accept_task = tokio::spawn(accept_loop.run());

        tracing::info!(
            "MJPEG server started on http://{} ({}, send timeout {:?})",
            local_addr,
            config.fps,
            config.send_timeout
        );

        *lifecycle = Some(RunningServer {
            local_addr,
            config,
            shutdown,
            accept_task,
        });

        Ok(local_addr)
    }

    /// Start with the default stream settings on `ip:port`
    pub async fn start_at(&self, ip: &str, port: u16) -> Result<SocketAddr> {
        self.start(ServerConfig::new(ip, port)?).await
    }

    /// Stop accepting, terminate every session and release the port
    ///
    /// Does nothing if the server is not running.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };

        running.shutdown.send_replace(true);
        if let Err(e) = running.accept_task.await {
            tracing::error!("Accept task failed: {}", e);
        }

        self.registry.drain();
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("MJPEG server on {} stopped", running.local_addr);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of sessions currently able to receive frames
    pub fn client_count(&self) -> usize {
        self.registry.count()
    }

    /// Snapshot of the connected clients
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|handle| handle.info())
            .collect()
    }

    /// Bound address of the current run
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Configuration of the current run
    pub async fn config(&self) -> Option<ServerConfig> {
        self.lifecycle.lock().await.as_ref().map(|r| r.config.clone())
    }
}

impl Drop for StreamingServer {
    fn drop(&mut self) {
        // Let the accept loop wind itself and its sessions down
        if let Some(running) = self.lifecycle.get_mut().take() {
            running.shutdown.send_replace(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, StaticFrameSource};

    fn server() -> StreamingServer {
        StreamingServer::new(StaticFrameSource::looping(vec![Frame::new(vec![0u8; 16])]))
    }

    #[tokio::test]
    async fn test_server_create() {
        let server = server();
        assert!(!server.is_running());
        assert_eq!(server.client_count(), 0);
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_start_stop() {
        let server = server();
        let addr = server.start_at("127.0.0.1", 0).await.unwrap();
        assert!(server.is_running());
        assert_eq!(server.local_addr().await, Some(addr));
        assert!(server.config().await.is_some());

        server.stop().await;
        assert!(!server.is_running());
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let server = server();
        server.start_at("127.0.0.1", 0).await.unwrap();

        let err = server.start_at("127.0.0.1", 0).await.unwrap_err();
        assert!(matches!(err, StreamError::AlreadyRunning));
        assert!(server.is_running());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_noop() {
        let server = server();
        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_invalid_address_fails_before_bind() {
        let server = server();
        let err = server.start_at("not-an-ip", 8080).await.unwrap_err();
        assert!(matches!(err, StreamError::InvalidAddress(_)));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let server = server();
        let config = ServerConfig::new("127.0.0.1", 0)
            .unwrap()
            .with_max_clients(Some(0));
        assert!(matches!(
            server.start(config).await.unwrap_err(),
            StreamError::InvalidConfig(_)
        ));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_start_stop_is_serialized() {
        let server = Arc::new(server());
        let config = ServerConfig::new("127.0.0.1", 0).unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let server = Arc::clone(&server);
            let config = config.clone();
            tasks.spawn(async move {
                if i % 2 == 0 {
                    server.start(config).await.map(Some)
                } else {
                    server.stop().await;
                    Ok(None)
                }
            });
        }

        let mut bound = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(Some(addr)) => bound.push(addr),
                Ok(None) => {}
                Err(e) => assert!(matches!(e, StreamError::AlreadyRunning), "{}", e),
            }
        }
        assert!(!bound.is_empty());

        if server.is_running() {
            let addr = server.local_addr().await.unwrap();
            assert!(bound.contains(&addr));
        } else {
            assert!(server.local_addr().await.is_none());
            assert_eq!(server.client_count(), 0);
        }

        server.stop().await;
        assert!(!server.is_running());
        assert_eq!(server.client_count(), 0);

        // Every run released its port
        for addr in bound {
            let acceptor = ConnectionAcceptor::bind(addr).await.unwrap();
            assert_eq!(acceptor.local_addr(), addr);
        }
    }
}
