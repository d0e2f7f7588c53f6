//! Binary wire format for the framed (non-WebSocket) transport.
//!
//! ```text
//! ┌────────────┬──────────────────┬──────────────────────┐
//! │ opcode: u8 │ length: i32 (BE) │ payload: length bytes│
//! └────────────┴──────────────────┴──────────────────────┘
//! ```
//!
//! An absent payload is written as length 0. On decode any length `<= 0`
//! yields an absent payload. Unknown opcodes are rejected on decode as well
//! as on construction.
//!
//! The length field is peer-controlled, so it is checked against
//! [`FrameCodec::max_frame_size`] before anything is allocated.

// ============================================================================
// Imports
// ============================================================================

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

use super::{Frame, OpCode};

// ============================================================================
// Constants
// ============================================================================

/// Size of the fixed header (`u8` opcode + `i32` length).
pub const HEADER_LEN: usize = 5;

/// Default upper bound for a single payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest payload the `i32` length field can describe.
const WIRE_LIMIT: usize = i32::MAX as usize;

// ============================================================================
// FrameCodec
// ============================================================================

/// Encoder/decoder for the binary frame format.
///
/// Cheap to copy; holds only the size bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    /// Creates a codec accepting payloads up to `max_frame_size` bytes.
    ///
    /// Values above `i32::MAX` are clamped to what the length field can carry.
    #[inline]
    #[must_use]
    pub const fn new(max_frame_size: usize) -> Self {
        let max_frame_size = if max_frame_size > WIRE_LIMIT {
            WIRE_LIMIT
        } else {
            max_frame_size
        };
        Self { max_frame_size }
    }

    /// Returns the payload size bound.
    #[inline]
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Returns the encoded size of `frame`.
    #[inline]
    #[must_use]
    pub fn encoded_len(frame: &Frame) -> usize {
        HEADER_LEN + frame.payload_len()
    }
}

// ============================================================================
// FrameCodec - Encode
// ============================================================================

impl FrameCodec {
    /// Appends the wire form of `frame` to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if the payload exceeds the bound.
    pub fn encode(&self, frame: &Frame, dst: &mut BytesMut) -> Result<()> {
        let len = frame.payload_len();
        if len > self.max_frame_size {
            return Err(Error::frame_too_large(len as u64, self.max_frame_size));
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_u8(frame.opcode().as_u8());
        // Bounded by WIRE_LIMIT through max_frame_size.
        dst.put_i32(len as i32);
        if let Some(payload) = frame.payload() {
            dst.put_slice(payload);
        }
        Ok(())
    }

    /// Encodes `frame` into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if the payload exceeds the bound.
    pub fn encode_to_bytes(&self, frame: &Frame) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(Self::encoded_len(frame));
        self.encode(frame, &mut buf)?;
        Ok(buf.freeze())
    }
}

// ============================================================================
// FrameCodec - Decode
// ============================================================================

impl FrameCodec {
    /// Decodes one frame from the front of `src`.
    ///
    /// Returns the frame and the number of bytes consumed, so several frames
    /// packed into one buffer can be decoded in sequence.
    ///
    /// # Errors
    ///
    /// - [`Error::Decode`] if the header or payload is truncated
    /// - [`Error::InvalidOpCode`] for an unknown opcode
    /// - [`Error::FrameTooLarge`] if the length exceeds the bound
    pub fn decode(&self, src: &[u8]) -> Result<(Frame, usize)> {
        if src.len() < HEADER_LEN {
            return Err(Error::decode("truncated header"));
        }

        let mut header = &src[..HEADER_LEN];
        let (opcode, length) = self.parse_header(header.get_u8(), header.get_i32())?;
        let Some(length) = length else {
            return Ok((Frame::new(opcode, None), HEADER_LEN));
        };

        let body = &src[HEADER_LEN..];
        if body.len() < length {
            return Err(Error::decode("truncated payload"));
        }

        let payload = Bytes::copy_from_slice(&body[..length]);
        Ok((Frame::new(opcode, Some(payload)), HEADER_LEN + length))
    }

    /// Reads exactly one frame from an async byte stream.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the stream ends before the first header byte
    /// - [`Error::Decode`] if the stream ends inside a frame
    /// - [`Error::InvalidOpCode`] for an unknown opcode
    /// - [`Error::FrameTooLarge`] if the length exceeds the bound
    /// - [`Error::Io`] for any other stream failure
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Frame>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut header = [0u8; HEADER_LEN];

        if reader.read(&mut header[..1]).await? == 0 {
            return Err(Error::ConnectionClosed);
        }
        reader
            .read_exact(&mut header[1..])
            .await
            .map_err(|e| Error::truncated(e, "header"))?;

        let mut cursor = &header[..];
        let (opcode, length) = self.parse_header(cursor.get_u8(), cursor.get_i32())?;
        let Some(length) = length else {
            return Ok(Frame::new(opcode, None));
        };

        let mut payload = BytesMut::zeroed(length);
        reader
            .read_exact(&mut payload[..])
            .await
            .map_err(|e| Error::truncated(e, "payload"))?;

        Ok(Frame::new(opcode, Some(payload.freeze())))
    }

    /// Validates opcode and length; `None` length means absent payload.
    fn parse_header(&self, code: u8, length: i32) -> Result<(OpCode, Option<usize>)> {
        let opcode = OpCode::try_from(code)?;
        if length <= 0 {
            return Ok((opcode, None));
        }

        let length = length as usize;
        if length > self.max_frame_size {
            return Err(Error::frame_too_large(length as u64, self.max_frame_size));
        }
        Ok((opcode, Some(length)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn codec() -> FrameCodec {
        FrameCodec::default()
    }

    #[test]
    fn test_encode_hello_literal() {
        let bytes = codec()
            .encode_to_bytes(&Frame::binary("hello"))
            .expect("encode");
        assert_eq!(
            &bytes[..],
            &[0x02, 0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o']
        );

        let (frame, used) = codec().decode(&bytes).expect("decode");
        assert_eq!(used, bytes.len());
        assert_eq!(frame, Frame::binary("hello"));
    }

    #[test]
    fn test_absent_payload_encodes_zero_length() {
        let bytes = codec().encode_to_bytes(&Frame::ping()).expect("encode");
        assert_eq!(&bytes[..], &[0x09, 0, 0, 0, 0]);

        let (frame, _) = codec().decode(&bytes).expect("decode");
        assert_eq!(frame.opcode(), OpCode::Ping);
        assert!(frame.payload().is_none());
    }

    #[test]
    fn test_negative_length_is_absent() {
        let raw = [0x02, 0xff, 0xff, 0xff, 0xff];
        let (frame, used) = codec().decode(&raw).expect("decode");
        assert_eq!(used, HEADER_LEN);
        assert!(frame.payload().is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        let raw = [0x03, 0, 0, 0, 0];
        assert!(matches!(
            codec().decode(&raw),
            Err(Error::InvalidOpCode { code: 0x03 })
        ));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(codec().decode(&[0x02, 0, 0]).unwrap_err().is_decode());
        assert!(
            codec()
                .decode(&[0x02, 0, 0, 0, 4, b'a'])
                .unwrap_err()
                .is_decode()
        );
    }

    #[test]
    fn test_length_bounded_before_allocation() {
        let small = FrameCodec::new(4);
        let raw = [0x02, 0x7f, 0xff, 0xff, 0xff];
        assert!(matches!(
            small.decode(&raw),
            Err(Error::FrameTooLarge { max: 4, .. })
        ));
        assert!(small.encode_to_bytes(&Frame::binary("hello")).is_err());
    }

    #[test]
    fn test_decode_back_to_back() {
        let mut buf = BytesMut::new();
        codec().encode(&Frame::text("a"), &mut buf).expect("encode");
        codec().encode(&Frame::close(), &mut buf).expect("encode");

        let (first, used) = codec().decode(&buf).expect("first");
        let (second, rest) = codec().decode(&buf[used..]).expect("second");
        assert_eq!(first, Frame::text("a"));
        assert_eq!(second, Frame::close());
        assert_eq!(used + rest, buf.len());
    }

    #[test]
    fn test_max_frame_size_clamped() {
        assert_eq!(FrameCodec::new(usize::MAX).max_frame_size(), i32::MAX as usize);
    }

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let mut buf = BytesMut::new();
        codec().encode(&Frame::binary("one"), &mut buf).expect("encode");
        codec().encode(&Frame::pong(), &mut buf).expect("encode");

        let mut reader = &buf[..];
        let first = codec().read_frame(&mut reader).await.expect("first");
        let second = codec().read_frame(&mut reader).await.expect("second");
        assert_eq!(first, Frame::binary("one"));
        assert_eq!(second, Frame::pong());

        let eof = codec().read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(eof, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_payload() {
        let raw = [0x02u8, 0, 0, 0, 10, b'x'];
        let mut reader = &raw[..];
        let err = codec().read_frame(&mut reader).await.unwrap_err();
        assert!(err.is_decode());
    }

    fn any_opcode() -> impl Strategy<Value = OpCode> {
        prop::sample::select(OpCode::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_round_trip(opcode in any_opcode(), payload in prop::option::of(prop::collection::vec(any::<u8>(), 0..512))) {
            let original = Frame::new(opcode, payload.clone().map(Bytes::from));
            let bytes = codec().encode_to_bytes(&original).expect("encode");
            let (decoded, used) = codec().decode(&bytes).expect("decode");

            prop_assert_eq!(used, bytes.len());
            prop_assert_eq!(decoded.opcode(), opcode);
            match payload {
                Some(p) if !p.is_empty() => prop_assert_eq!(decoded.payload().map(|b| b.to_vec()), Some(p)),
                _ => prop_assert!(decoded.payload().is_none()),
            }
        }
    }
}
