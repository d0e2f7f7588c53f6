//! Frame value type shared by every transport.
//!
//! A [`Frame`] is `{opcode, payload}`. The opcode space is the WebSocket one
//! (RFC 6455 §5.2) for both transports, so a frame read from a framed TCP
//! stream and one read from a WebSocket look the same to a [`Channel`].
//!
//! An empty payload and an absent payload are the same thing: constructors
//! normalise empty to absent, and the binary codec decodes a zero length as
//! absent.
//!
//! [`Channel`]: crate::channel::Channel
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Binary wire format for the framed transport |

// ============================================================================
// Submodules
// ============================================================================

/// Binary wire format: `opcode:u8 | length:i32(BE) | payload`.
pub mod codec;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{DEFAULT_MAX_FRAME_SIZE, FrameCodec, HEADER_LEN};

// ============================================================================
// OpCode
// ============================================================================

/// Frame kind. Wire values are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text data.
    Text = 0x1,
    /// Binary data.
    Binary = 0x2,
    /// Close control frame.
    Close = 0x8,
    /// Ping control frame.
    Ping = 0x9,
    /// Pong control frame.
    Pong = 0xa,
}

impl OpCode {
    /// All recognized opcodes.
    pub const ALL: [OpCode; 6] = [
        OpCode::Continuation,
        OpCode::Text,
        OpCode::Binary,
        OpCode::Close,
        OpCode::Ping,
        OpCode::Pong,
    ];

    /// Returns `true` for Close, Ping and Pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Returns `true` for Continuation, Text and Binary.
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        !self.is_control()
    }

    /// Returns the wire value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xa => Ok(Self::Pong),
            other => Err(Error::invalid_opcode(other)),
        }
    }
}

impl From<OpCode> for u8 {
    #[inline]
    fn from(op: OpCode) -> Self {
        op.as_u8()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// Unit of application data at the channel boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    opcode: OpCode,
    payload: Option<Bytes>,
}

impl Frame {
    /// Creates a frame. An empty payload is stored as absent.
    #[inline]
    #[must_use]
    pub fn new(opcode: OpCode, payload: Option<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.filter(|p| !p.is_empty()),
        }
    }

    /// Creates a frame from a raw opcode byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOpCode`] if `code` is not a recognized opcode.
    pub fn try_new(code: u8, payload: Option<Bytes>) -> Result<Self> {
        Ok(Self::new(OpCode::try_from(code)?, payload))
    }

    /// Binary data frame.
    #[inline]
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, Some(payload.into()))
    }

    /// Text data frame.
    #[inline]
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Text, Some(payload.into()))
    }

    /// Ping frame without payload.
    #[inline]
    #[must_use]
    pub fn ping() -> Self {
        Self::new(OpCode::Ping, None)
    }

    /// Pong frame without payload.
    #[inline]
    #[must_use]
    pub fn pong() -> Self {
        Self::new(OpCode::Pong, None)
    }

    /// Close frame without payload.
    #[inline]
    #[must_use]
    pub fn close() -> Self {
        Self::new(OpCode::Close, None)
    }

    /// Returns the opcode.
    #[inline]
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Returns the payload, `None` when absent.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Consumes the frame and returns its payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Option<Bytes> {
        self.payload
    }

    /// Payload length in bytes (0 when absent).
    #[inline]
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Bytes::len)
    }
}

// ============================================================================
// Tests
// ============================================================================
