//! Binary-codec transport.
//!
//! Frames travel as `opcode:u8 | length:i32(BE) | payload` (see
//! [`crate::frame::codec`]). Reads go through a buffered reader; writes are
//! encoded into a reusable buffer and written out in one call.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf, split};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameCodec};

use super::{Conn, FrameRead, FrameWrite, Transport, with_deadline};

// ============================================================================
// FramedReader
// ============================================================================

/// Read half of a [`FramedConn`].
pub struct FramedReader<R> {
    inner: BufReader<R>,
    codec: FrameCodec,
    deadline: Option<Instant>,
}

impl<R> FramedReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Wraps a byte reader.
    #[must_use]
    pub fn new(inner: R, codec: FrameCodec) -> Self {
        Self {
            inner: BufReader::new(inner),
            codec,
            deadline: None,
        }
    }
}

#[async_trait]
impl<R> FrameRead for FramedReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Frame> {
        let codec = self.codec;
        let frame = with_deadline(self.deadline, "read", codec.read_frame(&mut self.inner)).await?;
        trace!(opcode = %frame.opcode(), len = frame.payload_len(), "Framed read");
        Ok(frame)
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }
}

// ============================================================================
// FramedWriter
// ============================================================================

/// Write half of a [`FramedConn`].
pub struct FramedWriter<W> {
    inner: W,
    codec: FrameCodec,
    buf: BytesMut,
    deadline: Option<Instant>,
}

impl<W> FramedWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps a byte writer.
    #[must_use]
    pub fn new(inner: W, codec: FrameCodec) -> Self {
        Self {
            inner,
            codec,
            buf: BytesMut::new(),
            deadline: None,
        }
    }
}

#[async_trait]
impl<W> FrameWrite for FramedWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        self.buf.clear();
        self.codec.encode(&frame, &mut self.buf)?;

        let Self {
            inner, buf, deadline, ..
        } = self;
        with_deadline(*deadline, "write", async {
            inner.write_all(&buf[..]).await?;
            Ok(())
        })
        .await?;

        trace!(opcode = %frame.opcode(), len = frame.payload_len(), "Framed write");
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let inner = &mut self.inner;
        with_deadline(self.deadline, "flush", async {
            inner.flush().await?;
            Ok(())
        })
        .await
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// FramedConn
// ============================================================================

/// Duplex stream speaking the binary frame format.
///
/// # Example
///
/// ```ignore
/// let (stream, _) = listener.accept().await?;
/// let conn = FramedConn::new(stream);
/// let channel = Channel::with_generated_id(Box::new(conn), ChannelConfig::default())?;
/// ```
pub struct FramedConn<S> {
    reader: FramedReader<ReadHalf<S>>,
    writer: FramedWriter<WriteHalf<S>>,
}

impl<S> FramedConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps a stream with the default codec.
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self::with_codec(stream, FrameCodec::default())
    }

    /// Wraps a stream with a custom codec (e.g. a different size bound).
    #[must_use]
    pub fn with_codec(stream: S, codec: FrameCodec) -> Self {
        let (read_half, write_half) = split(stream);
        Self {
            reader: FramedReader::new(read_half, codec),
            writer: FramedWriter::new(write_half, codec),
        }
    }
}

impl FramedConn<TcpStream> {
    /// Dials `addr` over TCP and wraps the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the dial fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::connection(format!("TCP dial failed: {e}")))?;
        stream.set_nodelay(true)?;

        debug!(peer = ?stream.peer_addr().ok(), "Framed client connected");

        Ok(Self::new(stream))
    }
}

#[async_trait]
impl<S> FrameRead for FramedConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&mut self) -> Result<Frame> {
        self.reader.read_frame().await
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.reader.set_read_deadline(deadline);
    }
}

#[async_trait]
impl<S> FrameWrite for FramedConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        self.writer.write_frame(frame).await
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.writer.set_write_deadline(deadline);
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }
}

impl<S> Conn for FramedConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn transport(&self) -> Transport {
        Transport::Framed
    }

    fn into_split(self: Box<Self>) -> (Box<dyn FrameRead>, Box<dyn FrameWrite>) {
        let this = *self;
        (Box::new(this.reader), Box::new(this.writer))
    }
}

// ============================================================================
// Tests
// ============================================================================
