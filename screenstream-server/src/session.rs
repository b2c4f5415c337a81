//! Per-client streaming session
//!
//! A session moves through `Registered -> Streaming -> Terminated`. It writes
//! the preamble once, then repeats wait-for-tick, pull frame, write frame until
//! a read or write fails, the source runs dry or the server asks it to stop.
//! Whatever the exit path, the client is unregistered and its socket shut down
//! exactly once.

use std::future::Future;
use std::net::Shutdown;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::client::{ClientGuard, ClientHandle, SessionState};
use crate::config::ServerConfig;
use crate::error::{Result, StreamError};
use crate::frame::FrameStream;
use crate::mjpeg::MjpegWriter;

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The frame stream has no more frames
    SourceExhausted,
    /// The server asked the session to stop
    Shutdown,
    /// Writing to the client or pulling a frame failed
    Failed(StreamError),
}

/// One connected client and the stream it is being served
pub struct ClientSession {
    guard: ClientGuard,
    shutdown: watch::Receiver<bool>,
    reader: OwnedReadHalf,
    writer: MjpegWriter<OwnedWriteHalf>,
    frames: Box<dyn FrameStream>,
    frame_delay: Duration,
    send_timeout: Duration,
}

impl ClientSession {
    /// Bind an accepted connection to an already registered client
    pub fn new(
        stream: TcpStream,
        guard: ClientGuard,
        shutdown: watch::Receiver<bool>,
        frames: Box<dyn FrameStream>,
        config: &ServerConfig,
    ) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", guard.handle().id(), e);
        }

        let (reader, writer) = stream.into_split();

        Self {
            guard,
            shutdown,
            reader,
            writer: MjpegWriter::new(writer),
            frames,
            frame_delay: config.frame_delay(),
            send_timeout: config.send_timeout,
        }
    }

    pub fn handle(&self) -> &ClientHandle {
        self.guard.handle()
    }

    /// Serve the client until the session ends, then release it
    pub async fn run(mut self) -> SessionEnd {
        let end = self.serve().await;

        let id = self.handle().id();
        match &end {
            SessionEnd::SourceExhausted => debug!("{}: frame source exhausted", id),
            SessionEnd::Shutdown => debug!("{}: stopped by server", id),
            SessionEnd::Failed(e) => debug!("{}: session ended: {}", id, e),
        }
        if self.writer.headers_written() {
            debug!("{}: {} frames written", id, self.writer.frames_written());
        }

        self.close();
        end
    }

    async fn serve(&mut self) -> SessionEnd {
        if *self.shutdown.borrow_and_update() {
            return SessionEnd::Shutdown;
        }

        let send_timeout = self.send_timeout;
        let headers = tokio::select! {
            biased;
            _ = self.shutdown.changed() => return SessionEnd::Shutdown,
            result = with_timeout(send_timeout, self.writer.write_headers()) => result,
        };
        if let Err(e) = headers {
            return SessionEnd::Failed(e);
        }
        self.guard.handle().set_state(SessionState::Streaming);

        let mut ticker = time::interval_at(Instant::now() + self.frame_delay, self.frame_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut discard = [0u8; 1024];
        let mut reader_open = true;

        loop {
            // Wait for the next tick, discarding whatever the client sends meanwhile.
            // EOF is a half-close: stop reading but keep streaming.
            loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => return SessionEnd::Shutdown,
                    _ = ticker.tick() => break,
                    read = self.reader.read(&mut discard), if reader_open => match read {
                        Ok(0) => reader_open = false,
                        Ok(_) => {}
                        Err(e) => return SessionEnd::Failed(e.into()),
                    },
                }
            }

            let frame = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return SessionEnd::Shutdown,
                next = self.frames.next_frame() => match next {
                    Ok(Some(frame)) => frame,
                    Ok(None) => return SessionEnd::SourceExhausted,
                    Err(e) => return SessionEnd::Failed(e),
                },
            };

            let written = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return SessionEnd::Shutdown,
                result = with_timeout(send_timeout, self.writer.write_frame(&frame)) => result,
            };
            match written {
                Ok(()) => self.guard.handle().record_frame(),
                Err(e) => return SessionEnd::Failed(e),
            }
        }
    }

    /// Unregister, then shut the socket down in both directions
    ///
    /// If the peer already reset the connection the shutdown fails and the
    /// socket is simply closed on drop.
    fn close(self) {
        let ClientSession {
            guard,
            reader,
            writer,
            ..
        } = self;

        let id = guard.handle().id();
        drop(guard);

        let stream = match reader.reunite(writer.into_inner()) {
            Ok(stream) => stream,
            Err(_) => return,
        };

        match stream.into_std() {
            Ok(stream) => {
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    debug!("{}: shutdown failed ({}), closing socket", id, e);
                }
            }
            Err(e) => debug!("{}: failed to detach socket ({}), closing", id, e),
        }
    }
}

async fn with_timeout<F>(limit: Duration, write: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match time::timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => Err(StreamError::SendTimeout(limit)),
    }
}
