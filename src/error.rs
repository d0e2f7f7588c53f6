//! Error types for the gateway core.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use comet_gateway::{Channel, Result};
//!
//! async fn greet(channel: &Channel) -> Result<()> {
//!     channel.push("hello".into()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Transport | [`Error::Io`], [`Error::WebSocket`], [`Error::ConnectionClosed`], [`Error::DeadlineExceeded`] |
//! | Decode | [`Error::Decode`], [`Error::FrameTooLarge`] |
//! | Frame construction | [`Error::InvalidOpCode`] |
//! | Channel | [`Error::ChannelClosed`], [`Error::RemoteClose`], [`Error::ReadLoopActive`] |
//! | Setup | [`Error::Connection`], [`Error::Config`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// IO error on the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// WebSocket protocol or transport error from the collaborator library.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Peer disconnected or the stream is exhausted.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A read or write deadline elapsed before the operation finished.
    ///
    /// Returned when a connection stays idle longer than its read timeout,
    /// or a write cannot complete within its write timeout.
    #[error("{operation} deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded {
        /// The operation that timed out (`"read"`, `"write"`, `"flush"`, ...).
        operation: &'static str,
        /// Milliseconds between arming the deadline and its expiry.
        timeout_ms: u64,
    },

    // ========================================================================
    // Decode Errors
    // ========================================================================
    /// Malformed frame header or truncated payload.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// Frame length field exceeds the configured maximum.
    ///
    /// Checked before any payload allocation.
    #[error("Frame too large: {length} bytes (max {max})")]
    FrameTooLarge {
        /// Length announced by (or computed for) the frame.
        length: u64,
        /// Configured maximum frame size.
        max: usize,
    },

    // ========================================================================
    // Frame Construction Errors
    // ========================================================================
    /// Unrecognized opcode value.
    #[error("Invalid opcode: {code:#04x}")]
    InvalidOpCode {
        /// The raw opcode byte.
        code: u8,
    },

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// Push or write attempted after the channel was closed.
    #[error("Channel {id} has closed")]
    ChannelClosed {
        /// Channel identifier.
        id: String,
    },

    /// Peer sent a Close control frame.
    #[error("Remote closed channel {id}")]
    RemoteClose {
        /// Channel identifier.
        id: String,
    },

    /// A read loop is already running on this channel.
    #[error("Read loop already active on channel {id}")]
    ReadLoopActive {
        /// Channel identifier.
        id: String,
    },

    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// Dial or handshake failure.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Invalid configuration value.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a deadline exceeded error.
    #[inline]
    pub fn deadline_exceeded(operation: &'static str, timeout_ms: u64) -> Self {
        Self::DeadlineExceeded {
            operation,
            timeout_ms,
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a frame too large error.
    #[inline]
    pub fn frame_too_large(length: u64, max: usize) -> Self {
        Self::FrameTooLarge { length, max }
    }

    /// Creates an invalid opcode error.
    #[inline]
    pub fn invalid_opcode(code: u8) -> Self {
        Self::InvalidOpCode { code }
    }

    /// Creates a channel closed error.
    #[inline]
    pub fn channel_closed(id: impl Into<String>) -> Self {
        Self::ChannelClosed { id: id.into() }
    }

    /// Creates a remote close error.
    #[inline]
    pub fn remote_close(id: impl Into<String>) -> Self {
        Self::RemoteClose { id: id.into() }
    }

    /// Creates a read loop active error.
    #[inline]
    pub fn read_loop_active(id: impl Into<String>) -> Self {
        Self::ReadLoopActive { id: id.into() }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Maps an IO error raised while a frame was partially read.
    ///
    /// End-of-stream in the middle of a frame is a decode failure, not a
    /// clean disconnect.
    pub(crate) fn truncated(err: IoError, what: &str) -> Self {
        if err.kind() == ErrorKind::UnexpectedEof {
            Self::decode(format!("truncated {what}"))
        } else {
            Self::Io(err)
        }
    }

    /// Maps a WebSocket error, folding the library's "closed" states into
    /// [`Error::ConnectionClosed`].
    pub(crate) fn from_ws(err: WsError) -> Self {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::ConnectionClosed,
            WsError::Io(e) if e.kind() == ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            other => Self::WebSocket(other),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport-level failure.
    ///
    /// Deadline expiry counts as a transport failure.
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::WebSocket(_) | Self::ConnectionClosed | Self::DeadlineExceeded { .. }
        )
    }

    /// Returns `true` if this is a deadline error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::DeadlineExceeded { .. } => true,
            Self::Io(e) => e.kind() == ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Returns `true` if this is a decode error.
    #[inline]
    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::FrameTooLarge { .. })
    }

    /// Returns `true` if the channel or its peer has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::ChannelClosed { .. } | Self::RemoteClose { .. } | Self::ConnectionClosed
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::channel_closed("c-1");
        assert_eq!(err.to_string(), "Channel c-1 has closed");

        let err = Error::invalid_opcode(0x3);
        assert_eq!(err.to_string(), "Invalid opcode: 0x03");
    }

    #[test]
    fn test_deadline_is_transport_and_timeout() {
        let err = Error::deadline_exceeded("read", 1500);
        assert!(err.is_transport());
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "read deadline exceeded after 1500ms");
    }

    #[test]
    fn test_is_decode() {
        assert!(Error::decode("truncated header").is_decode());
        assert!(Error::frame_too_large(1 << 30, 1024).is_decode());
        assert!(!Error::ConnectionClosed.is_decode());
    }

    #[test]
    fn test_is_closed() {
        assert!(Error::channel_closed("a").is_closed());
        assert!(Error::remote_close("a").is_closed());
        assert!(Error::ConnectionClosed.is_closed());
        assert!(!Error::invalid_opcode(7).is_closed());
    }

    #[test]
    fn test_truncated_maps_eof_to_decode() {
        let eof = IoError::new(ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::truncated(eof, "payload"), Error::Decode { .. }));

        let reset = IoError::new(ErrorKind::ConnectionReset, "reset");
        assert!(matches!(Error::truncated(reset, "payload"), Error::Io(_)));
    }

    #[test]
    fn test_from_ws_closed() {
        assert!(matches!(
            Error::from_ws(WsError::ConnectionClosed),
            Error::ConnectionClosed
        ));
        assert!(matches!(
            Error::from_ws(WsError::AlreadyClosed),
            Error::ConnectionClosed
        ));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "pipe");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_transport());
    }
}
