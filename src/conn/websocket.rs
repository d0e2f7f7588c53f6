//! WebSocket transport.
//!
//! Wire framing, masking and the upgrade handshake are delegated to
//! `tokio-tungstenite`. This module fixes the opcode mapping (the same
//! numeric space as [`OpCode`]) and the role:
//!
//! - [`Role::Server`] never masks outgoing frames.
//! - [`Role::Client`] masks every outgoing frame with a fresh random key.
//! - Masked incoming frames are unmasked by the library before they reach
//!   [`WsReader::read_frame`].
//!
//! Payload bytes are copied across the library boundary in both directions.
//!
//! # Control frames
//!
//! Ping and Pong frames are surfaced to the caller like any other frame.
//! The library also queues an automatic Pong for every Ping it reads; an
//! explicit Pong written before that one is flushed replaces it, so a
//! channel answering Pings itself still emits a single Pong.
//!
//! A Close payload is `code:u16(BE) | reason:utf-8`.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut, BufMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{
    CloseCode, Data, OpCode as WsOpCode,
};
use tokio_tungstenite::tungstenite::protocol::frame::{CloseFrame, Frame as WsFrame};
use tokio_tungstenite::tungstenite::protocol::{Role as WsRole, WebSocketConfig};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::frame::{DEFAULT_MAX_FRAME_SIZE, Frame, OpCode};

use super::{Conn, FrameRead, FrameWrite, Role, Transport, with_deadline};

// ============================================================================
// Message Mapping
// ============================================================================

/// Library configuration with the frame/message size bound applied.
fn ws_config(max_frame_size: usize) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_frame_size(Some(max_frame_size))
        .max_message_size(Some(max_frame_size))
}

fn copied(bytes: &[u8]) -> Option<Bytes> {
    Some(Bytes::copy_from_slice(bytes))
}

/// Converts an incoming library message into a frame.
fn frame_from_message(message: Message) -> Result<Frame> {
    let frame = match message {
        Message::Text(text) => Frame::new(OpCode::Text, copied(text.as_bytes())),
        Message::Binary(data) => Frame::new(OpCode::Binary, copied(&data)),
        Message::Ping(data) => Frame::new(OpCode::Ping, copied(&data)),
        Message::Pong(data) => Frame::new(OpCode::Pong, copied(&data)),
        Message::Close(None) => Frame::close(),
        Message::Close(Some(close)) => {
            let mut payload = BytesMut::with_capacity(2 + close.reason.len());
            payload.put_u16(u16::from(close.code));
            payload.put_slice(close.reason.as_bytes());
            Frame::new(OpCode::Close, Some(payload.freeze()))
        }
        Message::Frame(_) => return Err(Error::decode("unexpected raw WebSocket frame")),
    };
    Ok(frame)
}

/// Converts an outgoing frame into a library message.
fn message_from_frame(frame: Frame) -> Result<Message> {
    let opcode = frame.opcode();
    let payload = frame
        .into_payload()
        .map(|p| Bytes::copy_from_slice(&p))
        .unwrap_or_default();

    let message = match opcode {
        OpCode::Text => {
            let text = String::from_utf8(payload.to_vec())
                .map_err(|e| Error::decode(format!("text payload is not UTF-8: {e}")))?;
            Message::Text(text.into())
        }
        OpCode::Binary => Message::Binary(payload),
        OpCode::Ping => Message::Ping(payload),
        OpCode::Pong => Message::Pong(payload),
        OpCode::Close => Message::Close(close_frame(payload)?),
        OpCode::Continuation => Message::Frame(WsFrame::message(
            payload,
            WsOpCode::Data(Data::Continue),
            true,
        )),
    };
    Ok(message)
}

fn close_frame(mut payload: Bytes) -> Result<Option<CloseFrame>> {
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.len() < 2 {
        return Err(Error::decode("close payload shorter than status code"));
    }

    let code = payload.get_u16();
    let reason = String::from_utf8(payload.to_vec())
        .map_err(|e| Error::decode(format!("close reason is not UTF-8: {e}")))?;

    Ok(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    }))
}

// ============================================================================
// WsReader
// ============================================================================

/// Read half of a [`WsConn`].
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    deadline: Option<Instant>,
}

#[async_trait]
impl<S> FrameRead for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Frame> {
        let stream = &mut self.stream;
        let message = with_deadline(self.deadline, "read", async {
            match stream.next().await {
                Some(Ok(message)) => Ok(message),
                Some(Err(e)) => Err(Error::from_ws(e)),
                None => Err(Error::ConnectionClosed),
            }
        })
        .await?;

        let frame = frame_from_message(message)?;
        trace!(opcode = %frame.opcode(), len = frame.payload_len(), "WebSocket read");
        Ok(frame)
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }
}

// ============================================================================
// WsWriter
// ============================================================================

/// Write half of a [`WsConn`].
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    deadline: Option<Instant>,
}

#[async_trait]
impl<S> FrameWrite for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        let opcode = frame.opcode();
        let len = frame.payload_len();
        let message = message_from_frame(frame)?;

        let sink = &mut self.sink;
        with_deadline(self.deadline, "write", async {
            sink.send(message).await.map_err(Error::from_ws)
        })
        .await?;

        trace!(opcode = %opcode, len, "WebSocket write");
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let sink = &mut self.sink;
        with_deadline(self.deadline, "flush", async {
            sink.flush().await.map_err(Error::from_ws)
        })
        .await
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    async fn close(&mut self) -> Result<()> {
        match self.sink.close().await.map_err(Error::from_ws) {
            Err(Error::ConnectionClosed) => Ok(()),
            other => other,
        }
    }
}

// ============================================================================
// WsConn
// ============================================================================

/// WebSocket connection in a fixed role.
///
/// # Example
///
/// ```ignore
/// let (stream, _) = listener.accept().await?;
/// let conn = WsConn::accept(stream).await?;
/// assert_eq!(conn.transport(), Transport::WebSocket(Role::Server));
/// ```
pub struct WsConn<S> {
    reader: WsReader<S>,
    writer: WsWriter<S>,
    role: Role,
}

impl<S> WsConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an established WebSocket stream.
    fn from_stream(ws_stream: WebSocketStream<S>, role: Role) -> Self {
        let (sink, stream) = ws_stream.split();
        Self {
            reader: WsReader {
                stream,
                deadline: None,
            },
            writer: WsWriter {
                sink,
                deadline: None,
            },
            role,
        }
    }

    /// Performs the server-side upgrade handshake on an accepted stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the upgrade fails.
    pub async fn accept(stream: S) -> Result<Self> {
        Self::accept_with_limit(stream, DEFAULT_MAX_FRAME_SIZE).await
    }

    /// Like [`WsConn::accept`], bounding frame and message size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the upgrade fails.
    pub async fn accept_with_limit(stream: S, max_frame_size: usize) -> Result<Self> {
        let ws_stream =
            tokio_tungstenite::accept_async_with_config(stream, Some(ws_config(max_frame_size)))
                .await
                .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        debug!("WebSocket server connection established");

        Ok(Self::from_stream(ws_stream, Role::Server))
    }

    /// Performs the client-side handshake over an existing stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the handshake fails.
    pub async fn client<R>(request: R, stream: S) -> Result<Self>
    where
        R: IntoClientRequest + Unpin,
    {
        let (ws_stream, _response) = tokio_tungstenite::client_async_with_config(
            request,
            stream,
            Some(ws_config(DEFAULT_MAX_FRAME_SIZE)),
        )
        .await
        .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!("WebSocket client connection established");

        Ok(Self::from_stream(ws_stream, Role::Client))
    }

    /// Wraps a stream whose handshake already happened elsewhere.
    pub async fn from_raw_socket(stream: S, role: Role) -> Self {
        let ws_role = match role {
            Role::Server => WsRole::Server,
            Role::Client => WsRole::Client,
        };
        let ws_stream =
            WebSocketStream::from_raw_socket(stream, ws_role, Some(ws_config(DEFAULT_MAX_FRAME_SIZE)))
                .await;
        Self::from_stream(ws_stream, role)
    }

    /// Returns the role this connection plays.
    #[inline]
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}

impl WsConn<MaybeTlsStream<TcpStream>> {
    /// Dials `request` (e.g. `"ws://127.0.0.1:2000"`) and performs the
    /// client handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the dial or handshake fails.
    pub async fn connect<R>(request: R) -> Result<Self>
    where
        R: IntoClientRequest + Unpin,
    {
        let (ws_stream, _response) = tokio_tungstenite::connect_async_with_config(
            request,
            Some(ws_config(DEFAULT_MAX_FRAME_SIZE)),
            true,
        )
        .await
        .map_err(|e| Error::connection(format!("WebSocket connect failed: {e}")))?;

        debug!("WebSocket client connected");

        Ok(Self::from_stream(ws_stream, Role::Client))
    }
}

#[async_trait]
impl<S> FrameRead for WsConn<S>
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
impl<S> FrameWrite for WsConn<S>
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

impl<S> Conn for WsConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn transport(&self) -> Transport {
        Transport::WebSocket(self.role)
    }

    fn into_split(self: Box<Self>) -> (Box<dyn FrameRead>, Box<dyn FrameWrite>) {
        let this = *self;
        (Box::new(this.reader), Box::new(this.writer))
    }
}

// ============================================================================
// Tests
// ============================================================================
