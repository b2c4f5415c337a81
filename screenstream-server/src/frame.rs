//! Frames and the sources that produce them
//!
//! The server never captures anything itself. It consumes encoded images
//! through [`FrameSource`], which hands each session its own [`FrameStream`].
//! A stream is owned by exactly one session, so implementations never see
//! concurrent calls on the same stream.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::Result;

/// One encoded still image, ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes, always taken from the payload itself
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

/// Per-session sequence of frames
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame, or `None` once the sequence is exhausted
    ///
    /// Must be cancel-safe: the session drops this future when the server
    /// stops while it is pending.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Producer of frame streams, shared by every session of a server
pub trait FrameSource: Send + Sync {
    /// Open a new stream for one session
    fn open(&self) -> Box<dyn FrameStream>;
}

impl<S: FrameSource + ?Sized> FrameSource for Arc<S> {
    fn open(&self) -> Box<dyn FrameStream> {
        (**self).open()
    }
}

/// Fixed list of frames, replayed from the start for every session
#[derive(Debug, Clone)]
pub struct StaticFrameSource {
    frames: Arc<[Frame]>,
    looping: bool,
}

impl StaticFrameSource {
    /// Finite source: each session receives every frame once, then ends
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            looping: false,
        }
    }

    /// Endless source cycling through the frames
    pub fn looping(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            looping: true,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for StaticFrameSource {
    fn open(&self) -> Box<dyn FrameStream> {
        Box::new(StaticFrameStream {
            frames: Arc::clone(&self.frames),
            looping: self.looping,
            position: 0,
        })
    }
}

struct StaticFrameStream {
    frames: Arc<[Frame]>,
    looping: bool,
    position: usize,
}

#[async_trait]
impl FrameStream for StaticFrameStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frames.is_empty() {
            return Ok(None);
        }

        if self.position >= self.frames.len() {
            if !self.looping {
                return Ok(None);
            }
            self.position = 0;
        }

        let frame = self.frames[self.position].clone();
        self.position += 1;
        Ok(Some(frame))
    }
}

/// Fan-out source: every open stream sees the same published frames
///
/// Streams opened after a frame was published do not receive it. A stream
/// that falls behind by more than `capacity` frames skips ahead to the
/// oldest frame still buffered.
#[derive(Debug, Clone)]
pub struct BroadcastFrameSource {
    sender: broadcast::Sender<Frame>,
}

impl BroadcastFrameSource {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a frame to every open stream, returning how many received it
    pub fn publish(&self, frame: Frame) -> usize {
        self.sender.send(frame).unwrap_or(0)
    }

    /// Number of streams currently subscribed
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl FrameSource for BroadcastFrameSource {
    fn open(&self) -> Box<dyn FrameStream> {
        Box::new(BroadcastFrameStream {
            receiver: self.sender.subscribe(),
        })
    }
}

struct BroadcastFrameStream {
    receiver: broadcast::Receiver<Frame>,
}

#[async_trait]
impl FrameStream for BroadcastFrameStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.receiver.recv().await {
                Ok(frame) => return Ok(Some(frame)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Frame stream lagged, skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}
