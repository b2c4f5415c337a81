//! MJPEG streaming server
//!
//! Serves a continuously regenerated sequence of still images to any number of
//! HTTP clients as one long-lived `multipart/x-mixed-replace` body, which
//! browsers and media players render as live video.
//!
//! # Features
//!
//! - TCP server with one task per connected client
//! - Bit-exact MJPEG multipart framing, flushed after every frame
//! - Thread-safe client registry for counting and shutdown
//! - Idempotent start/stop with clean rebinding of the same address
//! - Pluggable frame sources: per-session replay or fan-out broadcast
//!
//! # Architecture
//!
//! ```text
//! StreamingServer::start
//!   │
//!   └─> AcceptLoop (ConnectionAcceptor)
//!         │
//!         ├─> ClientRegistry (add on accept, remove on exit)
//!         │
//!         └─> ClientSession per client
//!               │
//!               ├─> FrameStream::next_frame   (paced by Fps)
//!               └─> MjpegWriter::write_frame  (header, payload, newline, flush)
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use screenstream_server::{Fps, Frame, ServerConfig, StaticFrameSource, StreamingServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let jpeg = std::fs::read("frame.jpg")?;
//!     let server = StreamingServer::new(StaticFrameSource::looping(vec![Frame::new(jpeg)]));
//!
//!     let config = ServerConfig::new("127.0.0.1", 8080)?.with_fps(Fps::Thirty);
//!     let addr = server.start(config).await?;
//!     println!("Streaming on http://{}", addr);
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

pub mod acceptor;
pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod mjpeg;
pub mod server;
pub mod session;

// Re-exports
pub use acceptor::ConnectionAcceptor;
pub use client::{ClientHandle, ClientId, ClientInfo, ClientRegistry, SessionState};
pub use config::{Fps, ServerConfig, DEFAULT_PORT, DEFAULT_SEND_TIMEOUT};
pub use error::{Result, StreamError};
pub use frame::{BroadcastFrameSource, Frame, FrameSource, FrameStream, StaticFrameSource};
pub use mjpeg::MjpegWriter;
pub use server::StreamingServer;
pub use session::{ClientSession, SessionEnd};
