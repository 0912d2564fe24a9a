//! Frame I/O over an ordered byte stream

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use weft_core::{WeftError, WeftResult};
use weft_wire::{Frame, FrameHeader, HEADER_SIZE};

const READ_CHUNK: usize = 16 * 1024;

/// Reads and writes wire frames over any `AsyncRead + AsyncWrite`
/// stream (a TCP socket, a duplex pipe, a tunnel).
///
/// Reads are buffered internally so a cancelled `read_frame` never
/// loses partial bytes; callers may freely race it in `select!`.
pub struct FrameStream<T> {
    io: T,
    buf: BytesMut,
}

impl<T: AsyncRead + AsyncWrite + Unpin> FrameStream<T> {
    pub fn new(io: T) -> Self {
        FrameStream {
            io,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Read the next complete frame, blocking until one arrives.
    pub async fn read_frame(&mut self) -> WeftResult<Frame> {
        loop {
            if let Some(frame) = self.try_parse()? {
                return Ok(frame);
            }
            let n = self
                .io
                .read_buf(&mut self.buf)
                .await
                .map_err(|e| WeftError::Transport(e.to_string()))?;
            if n == 0 {
                return Err(WeftError::Transport("connection closed".into()));
            }
        }
    }

    fn try_parse(&mut self) -> WeftResult<Option<Frame>> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let header = FrameHeader::parse(&self.buf[..HEADER_SIZE])?;
        let total = HEADER_SIZE + header.payload_len as usize;
        if self.buf.len() < total {
            self.buf.reserve(total - self.buf.len());
            return Ok(None);
        }
        let raw = self.buf.split_to(total);
        let frame = Frame::from_parts(header, &raw[HEADER_SIZE..])?;
        Ok(Some(frame))
    }

    /// Serialize and flush one frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> WeftResult<()> {
        let raw = frame.serialize()?;
        self.io
            .write_all(&raw)
            .await
            .map_err(|e| WeftError::Transport(e.to_string()))?;
        self.io
            .flush()
            .await
            .map_err(|e| WeftError::Transport(e.to_string()))
    }
}
