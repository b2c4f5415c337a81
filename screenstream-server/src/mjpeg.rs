//! MJPEG wire framing over a multipart/x-mixed-replace HTTP body
//!
//! The byte layout is fixed:
//!
//! ```text
//! HTTP/1.1 200 OK\n
//! Content-Type: multipart/x-mixed-replace; boundary=--boundary\n
//! (per frame)
//! \n--boundary\nContent-Type: image/jpeg\nContent-Length: <N>\n\n
//! <N payload bytes>
//! \n
//! ```

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::frame::Frame;

/// Boundary marker separating parts
pub const BOUNDARY: &str = "--boundary";

/// Content type of every part
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

/// Response preamble, written once per connection
pub const RESPONSE_HEADERS: &str =
    "HTTP/1.1 200 OK\nContent-Type: multipart/x-mixed-replace; boundary=--boundary\n";

/// Terminator written after each payload
pub const PART_TERMINATOR: &[u8] = b"\n";

/// Header preceding a payload of `content_length` bytes
pub fn part_header(content_length: usize) -> String {
    format!(
        "\n{}\nContent-Type: {}\nContent-Length: {}\n\n",
        BOUNDARY, PART_CONTENT_TYPE, content_length
    )
}

/// The three wire chunks of one frame, in write order
#[derive(Debug)]
pub struct FrameParts<'a> {
    pub header: String,
    pub payload: &'a [u8],
    pub terminator: &'static [u8],
}

/// Split a frame into header, payload and terminator
///
/// Content-Length is computed from the same slice that is returned as the
/// payload, so the two can never disagree.
pub fn frame_parts(frame: &Frame) -> FrameParts<'_> {
    let payload = frame.data();
    FrameParts {
        header: part_header(payload.len()),
        payload,
        terminator: PART_TERMINATOR,
    }
}

/// Writes the multipart stream to one client's byte sink
pub struct MjpegWriter<W> {
    sink: W,
    headers_written: bool,
    frames_written: u64,
}

impl<W: AsyncWrite + Unpin> MjpegWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            headers_written: false,
            frames_written: 0,
        }
    }

    /// Write the response preamble
    ///
    /// Only the first call writes anything.
    pub async fn write_headers(&mut self) -> Result<()> {
        if self.headers_written {
            return Ok(());
        }

        self.sink.write_all(RESPONSE_HEADERS.as_bytes()).await?;
        self.sink.flush().await?;
        self.headers_written = true;
        Ok(())
    }

    /// Write one frame as a part and flush it to the client
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if !self.headers_written {
            self.write_headers().await?;
        }

        let parts = frame_parts(frame);
        self.sink.write_all(parts.header.as_bytes()).await?;
        self.sink.write_all(parts.payload).await?;
        self.sink.write_all(parts.terminator).await?;
        self.sink.flush().await?;

        self.frames_written += 1;
        Ok(())
    }

    pub fn headers_written(&self) -> bool {
        self.headers_written
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
