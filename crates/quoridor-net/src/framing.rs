//! Byte-stream framing
//!
//! Frames are `[len: u8][type: u8][payload; len]`. [`FrameReader`] buffers what
//! it has read so far between calls, which makes `read_frame` safe to race in a
//! `select!`: a cancelled read never loses bytes.

use async_trait::async_trait;
use quoridor_core::{QuoridorError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::protocol::RawFrame;
use crate::transport::{AsyncReader, AsyncWriter};

const HEADER: usize = 2;

/// Frame reader over any byte stream
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

pub type TcpFrameReader = FrameReader<OwnedReadHalf>;
pub type TcpFrameWriter = FrameWriter<OwnedWriteHalf>;

impl<R> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(HEADER + u8::MAX as usize),
        }
    }

    fn take_frame(&mut self) -> Option<RawFrame> {
        let len = *self.buf.first()? as usize;
        if self.buf.len() < HEADER + len {
            return None;
        }
        let kind = self.buf[1];
        let payload = self.buf[HEADER..HEADER + len].to_vec();
        self.buf.drain(..HEADER + len);
        Some(RawFrame { kind, payload })
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> AsyncReader for FrameReader<R> {
    async fn read_frame(&mut self) -> Result<RawFrame> {
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(frame);
            }
            let mut chunk = [0u8; 512];
            let n = self
                .inner
                .read(&mut chunk)
                .await
                .map_err(|e| QuoridorError::IpcError(format!("read failed: {}", e)))?;
            if n == 0 {
                return Err(QuoridorError::IpcError(if self.buf.is_empty() {
                    "connection closed".into()
                } else {
                    "connection closed mid-frame".into()
                }));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Frame writer over any byte stream
pub struct FrameWriter<W>(pub W);

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> AsyncWriter for FrameWriter<W> {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() < HEADER || frame[0] as usize != frame.len() - HEADER {
            return Err(QuoridorError::ProtocolError(format!(
                "malformed frame of {} bytes",
                frame.len()
            )));
        }
        self.0
            .write_all(frame)
            .await
            .map_err(|e| QuoridorError::IpcError(format!("write failed: {}", e)))?;

        // Frames are small and latency matters more than batching
        self.0
            .flush()
            .await
            .map_err(|e| QuoridorError::IpcError(format!("flush failed: {}", e)))?;

        Ok(())
    }
}
