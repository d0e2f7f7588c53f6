//! Frame-level connection abstraction.
//!
//! A [`Conn`] wraps exactly one duplex byte stream and exposes frame reads
//! and writes over it. Two transports exist:
//!
//! ```text
//!                ┌──────────────┐   opcode|len|payload   ┌──────────┐
//!  FramedConn ──►│ FramedReader │◄───────────────────────│          │
//!                │ FramedWriter │───────────────────────►│  duplex  │
//!                └──────────────┘                        │  stream  │
//!                ┌──────────────┐   RFC 6455 frames      │ (TCP ..) │
//!  WsConn ──────►│   WsReader   │◄───────────────────────│          │
//!                │   WsWriter   │───────────────────────►│          │
//!                └──────────────┘                        └──────────┘
//! ```
//!
//! The transport is chosen once, when the stream is wrapped, and never
//! changes. A conn splits into independent read and write halves so one
//! task can block on reads while another writes.
//!
//! # Deadlines
//!
//! Each half carries an optional deadline. Every read (or write/flush) runs
//! under the deadline in force when it starts and fails with
//! [`Error::DeadlineExceeded`] if it elapses. After a deadline error the
//! stream position is unspecified; treat the conn as failed.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `framed` | Binary-codec transport |
//! | `websocket` | WebSocket transport (server and client roles) |

// ============================================================================
// Submodules
// ============================================================================

/// Binary-codec transport over a raw duplex stream.
pub mod framed;

/// WebSocket transport backed by `tokio-tungstenite`.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tokio::time::{Instant, timeout_at};

use crate::error::{Error, Result};
use crate::frame::Frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use framed::{FramedConn, FramedReader, FramedWriter};
pub use websocket::{WsConn, WsReader, WsWriter};

// ============================================================================
// Transport
// ============================================================================

/// WebSocket endpoint role. Decides the masking rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepting side: outgoing frames are never masked.
    Server,
    /// Dialing side: every outgoing frame is masked with a fresh key.
    Client,
}

/// Which transport a conn was wrapped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Custom binary codec over a raw stream.
    Framed,
    /// WebSocket in the given role.
    WebSocket(Role),
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framed => f.write_str("framed"),
            Self::WebSocket(Role::Server) => f.write_str("websocket-server"),
            Self::WebSocket(Role::Client) => f.write_str("websocket-client"),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Read half of a conn.
#[async_trait]
pub trait FrameRead: Send {
    /// Reads the next frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] when the peer disconnects or the stream ends
    /// - [`Error::DeadlineExceeded`] when the read deadline elapses
    /// - [`Error::Decode`] / [`Error::InvalidOpCode`] on a malformed frame
    async fn read_frame(&mut self) -> Result<Frame>;

    /// Sets the deadline for subsequent reads. `None` disables it.
    fn set_read_deadline(&mut self, deadline: Option<Instant>);
}

/// Write half of a conn.
#[async_trait]
pub trait FrameWrite: Send {
    /// Writes one frame.
    async fn write_frame(&mut self, frame: Frame) -> Result<()>;

    /// Flushes buffered output.
    ///
    /// Both current transports write immediately, so this only forwards to
    /// the stream's own flush.
    async fn flush(&mut self) -> Result<()>;

    /// Sets the deadline for subsequent writes and flushes. `None` disables it.
    fn set_write_deadline(&mut self, deadline: Option<Instant>);

    /// Closes the write direction of the stream.
    async fn close(&mut self) -> Result<()>;
}

/// A frame-level duplex connection.
pub trait Conn: FrameRead + FrameWrite {
    /// Returns the transport selected when the stream was wrapped.
    fn transport(&self) -> Transport;

    /// Splits into independently usable read and write halves.
    fn into_split(self: Box<Self>) -> (Box<dyn FrameRead>, Box<dyn FrameWrite>);
}

// ============================================================================
// Deadline Helper
// ============================================================================

/// Runs `op` under `deadline`, mapping expiry to [`Error::DeadlineExceeded`].
pub(crate) async fn with_deadline<T, F>(
    deadline: Option<Instant>,
    operation: &'static str,
    op: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(at) = deadline else {
        return op.await;
    };

    let armed = Instant::now();
    match timeout_at(at, op).await {
        Ok(result) => result,
        Err(_) => {
            let waited = at.saturating_duration_since(armed).as_millis() as u64;
            Err(Error::deadline_exceeded(operation, waited))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
