//! Comet Gateway - transport-agnostic persistent-connection gateway.
//!
//! Wraps long-lived client connections in per-connection actors that a
//! server can push messages through and receive messages from, regardless
//! of whether the peer speaks a small binary frame protocol over a raw
//! stream or WebSocket.
//!
//! # Architecture
//!
//! - **Frames**: every transport reads and writes the same [`Frame`]
//!   (opcode + optional payload).
//! - **Conns**: [`FramedConn`] and [`WsConn`] implement [`Conn`], which
//!   splits into independent read and write halves.
//! - **Channels**: a [`Channel`] owns one conn, a bounded outbound queue
//!   drained by a writer task, and a read loop that dispatches inbound data
//!   to a [`MessageListener`].
//! - **Pool**: [`ChannelPool`] maps ids to live channels.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use comet_gateway::{Agent, Channel, ChannelConfig, ChannelPool, FramedConn, MessageListener};
//! use tokio::net::TcpListener;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl MessageListener for Echo {
//!     async fn receive(&self, source: Arc<dyn Agent>, payload: Bytes) {
//!         let _ = source.push(payload).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> comet_gateway::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:9000").await?;
//!     let pool = Arc::new(ChannelPool::new());
//!
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         let channel = Channel::with_generated_id(
//!             Box::new(FramedConn::new(stream)),
//!             ChannelConfig::default(),
//!         )?;
//!         pool.add(Arc::clone(&channel));
//!
//!         let pool = Arc::clone(&pool);
//!         tokio::spawn(async move {
//!             let _ = channel.read_loop(Arc::new(Echo)).await;
//!             pool.del(channel.id());
//!             let _ = channel.shutdown().await;
//!         });
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channel`] | [`Channel`] actor, [`ChannelPool`], configuration |
//! | [`conn`] | [`Conn`] abstraction with framed and WebSocket transports |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`frame`] | [`Frame`], [`OpCode`] and the binary [`FrameCodec`] |

// ============================================================================
// Modules
// ============================================================================

/// Per-connection actors and the channel registry.
pub mod channel;

/// Frame transports.
///
/// Both transports implement [`Conn`] and are interchangeable behind a
/// `Box<dyn Conn>`.
pub mod conn;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Frame model and binary codec.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channel::{Agent, Channel, ChannelConfig, ChannelPool, MessageListener};

// Connection types
pub use conn::{Conn, FrameRead, FrameWrite, FramedConn, Role, Transport, WsConn};

// Error types
pub use error::{Error, Result};

// Frame types
pub use frame::{Frame, FrameCodec, OpCode};
