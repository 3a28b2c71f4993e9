//! Protocol codec for encoding/decoding frames
//!
//! Handles framing of protocol messages on a byte stream. The decoder buffers
//! partial input and only hands complete frames to the registry.

use bytes::{Buf, BytesMut};

use super::{CodecError, CodecResult, Header, Message, Registry};

/// Maximum frame size: the length field is 16 bits wide
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// A message together with its correlation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlation id chosen by the sender
    pub xid: u32,
    /// The actual message
    pub message: Message,
}

impl Frame {
    pub fn new(xid: u32, message: Message) -> Self {
        Self { xid, message }
    }

    /// Pack the frame into a fresh buffer
    pub fn pack(&self) -> CodecResult<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.message.frame_len());
        Encoder::new().encode(self, &mut buf)?;
        Ok(buf)
    }
}

/// Encodes frames into the wire format
#[derive(Debug, Default, Clone, Copy)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a frame into a buffer
    pub fn encode(&self, frame: &Frame, buf: &mut BytesMut) -> CodecResult<()> {
        let length = frame.message.frame_len();
        if length > MAX_FRAME_SIZE {
            return Err(CodecError::MessageTooLarge(length, MAX_FRAME_SIZE));
        }

        buf.reserve(length);
        let header = Header {
            length: length as u16,
            message_type: frame.message.message_type().code(),
            xid: frame.xid,
        };
        header.encode(buf);
        frame.message.encode_body(buf);

        Ok(())
    }
}

/// Decodes frames from the wire format
pub struct Decoder {
    registry: &'static Registry,
    state: DecodeState,
}

#[derive(Default)]
enum DecodeState {
    #[default]
    Header,
    Body(Header),
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_registry(Registry::global())
    }

    pub fn with_registry(registry: &'static Registry) -> Self {
        Self {
            registry,
            state: DecodeState::Header,
        }
    }

    /// Attempt to decode a frame from the buffer
    /// Returns Ok(None) if more data is needed
    pub fn decode(&mut self, buf: &mut BytesMut) -> CodecResult<Option<Frame>> {
        loop {
            match &self.state {
                DecodeState::Header => {
                    if buf.len() < Header::SIZE {
                        return Ok(None);
                    }

                    let header = Header::decode(&mut &buf[..Header::SIZE])?;
                    buf.advance(Header::SIZE);

                    self.state = DecodeState::Body(header);
                }
                DecodeState::Body(header) => {
                    let header = *header;
                    if buf.len() < header.body_len() {
                        return Ok(None);
                    }

                    let body = buf.split_to(header.body_len());
                    self.state = DecodeState::Header;

                    let message = self.registry.decode(&header, &body)?;
                    return Ok(Some(Frame::new(header.xid, message)));
                }
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ModuleStatus, NodeId, NodeInfo, NodeKind, StateValue};

    fn status_request() -> Message {
        Message::ModuleStatusRequest {
            node: NodeId::new(NodeKind::HardwareSwitch, 1000),
            module: NodeId::module(NodeKind::HardwareModule, 4, 0).unwrap(),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut decoder = Decoder::new();
        let original = Frame::new(99, status_request());
        let mut buf = original.pack().unwrap();
        assert_eq!(buf.len(), Header::SIZE + 2 * NodeId::SIZE);
        assert_eq!(&buf[..3], &[0x00, 0x1B, 0xF6]);

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_messages() {
        let encoder = Encoder::new();
        let mut decoder = Decoder::new();
        let mut buf = BytesMut::new();

        let frames = vec![
            Frame::new(1, status_request()),
            Frame::new(
                2,
                Message::NodesAdd {
                    nodes: vec![NodeInfo::new(NodeId::new(NodeKind::Output, 999), "Output", "Output")],
                },
            ),
            Frame::new(
                3,
                Message::SetStateValues {
                    module: NodeId::module(NodeKind::SoftwareModule, 100, 0).unwrap(),
                    values: vec![StateValue::u64("counter", 12)],
                },
            ),
        ];

        for frame in &frames {
            encoder.encode(frame, &mut buf).unwrap();
        }

        for original in &frames {
            let frame = decoder.decode(&mut buf).unwrap().unwrap();
            assert_eq!(&frame, original);
        }
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_partial_frame() {
        let mut decoder = Decoder::new();
        let bytes = Frame::new(5, status_request()).pack().unwrap();

        let mut buf = BytesMut::new();
        for (i, byte) in bytes.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let result = decoder.decode(&mut buf).unwrap();
            if i + 1 < bytes.len() {
                assert!(result.is_none(), "frame completed early at byte {}", i);
            } else {
                assert_eq!(result.unwrap().xid, 5);
            }
        }
    }

    #[test]
    fn test_outbound_only_frame_rejected() {
        let mut decoder = Decoder::new();
        let frame = Frame::new(
            0,
            Message::ModuleStatusChange {
                module: NodeId::module(NodeKind::HardwareModule, 1, 0).unwrap(),
                status: ModuleStatus::Ready,
            },
        );
        let mut buf = frame.pack().unwrap();
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(CodecError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_bad_header_length() {
        let mut decoder = Decoder::new();
        let mut buf = BytesMut::from(&[0x00, 0x03, 0xF0, 0, 0, 0, 0][..]);
        assert!(decoder.decode(&mut buf).unwrap_err().is_format_error());
    }

    #[test]
    fn test_message_too_large() {
        let message = Message::ModuleAlert {
            module: NodeId::module(NodeKind::HardwareModule, 1, 0).unwrap(),
            message: "x".repeat(MAX_FRAME_SIZE),
        };
        let mut buf = BytesMut::new();
        assert!(matches!(
            Encoder::new().encode(&Frame::new(0, message), &mut buf),
            Err(CodecError::MessageTooLarge(_, MAX_FRAME_SIZE))
        ));
        assert!(buf.is_empty());
    }
}
