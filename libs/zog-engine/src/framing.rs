use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{ByteOrder, FramingConfig};
use crate::error::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },

    #[error("stream ended inside a frame ({remaining} bytes left)")]
    Truncated { remaining: usize },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Upper bound on what one `decode` call reserves for a partial frame.
/// Larger frames grow the buffer as their bytes arrive.
const MAX_RESERVE: usize = 64 * 1024;

/// Length-prefixed frames: `[len][payload]`, header of 1, 2 or 4 bytes.
#[derive(Debug, Clone)]
pub struct LengthPrefixedCodec {
    length_bytes: usize,
    byte_order: ByteOrder,
    max_payload: usize,
}

impl LengthPrefixedCodec {
    pub fn new(config: &FramingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            length_bytes: config.length_bytes,
            byte_order: config.byte_order,
            max_payload: config.max_payload,
        })
    }

    fn read_len(&self, header: &[u8]) -> usize {
        match (self.length_bytes, self.byte_order) {
            (1, _) => header[0] as usize,
            (2, ByteOrder::Big) => u16::from_be_bytes([header[0], header[1]]) as usize,
            (2, ByteOrder::Little) => u16::from_le_bytes([header[0], header[1]]) as usize,
            (_, ByteOrder::Big) => {
                u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize
            }
            (_, ByteOrder::Little) => {
                u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize
            }
        }
    }

    /// Largest payload the header can describe, capped by `max_payload`.
    fn limit(&self) -> usize {
        let header_max = match self.length_bytes {
            1 => u8::MAX as usize,
            2 => u16::MAX as usize,
            _ => u32::MAX as usize,
        };
        if self.max_payload > 0 {
            header_max.min(self.max_payload)
        } else {
            header_max
        }
    }
}

impl Decoder for LengthPrefixedCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        let n = self.length_bytes;
        if src.len() < n {
            return Ok(None);
        }

        let len = self.read_len(&src[..n]);
        if self.max_payload > 0 && len > self.max_payload {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_payload,
            });
        }

        let total = n + len;
        if src.len() < total {
            src.reserve((total - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        src.advance(n);
        Ok(Some(src.split_to(len)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::Truncated {
                remaining: src.len(),
            }),
        }
    }
}

impl<'a> Encoder<&'a [u8]> for LengthPrefixedCodec {
    type Error = FrameError;

    fn encode(&mut self, data: &'a [u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = data.len();
        let max = self.limit();
        if len > max {
            return Err(FrameError::TooLarge { len, max });
        }

        dst.reserve(self.length_bytes + len);
        match (self.length_bytes, self.byte_order) {
            (1, _) => dst.put_u8(len as u8),
            (2, ByteOrder::Big) => dst.put_u16(len as u16),
            (2, ByteOrder::Little) => dst.put_u16_le(len as u16),
            (_, ByteOrder::Big) => dst.put_u32(len as u32),
            (_, ByteOrder::Little) => dst.put_u32_le(len as u32),
        }
        dst.extend_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(length_bytes: usize, byte_order: ByteOrder, max_payload: usize) -> LengthPrefixedCodec {
        LengthPrefixedCodec::new(&FramingConfig {
            length_bytes,
            byte_order,
            max_payload,
        })
        .unwrap()
    }

    #[test]
    fn waits_for_full_frame() {
        let mut c = codec(4, ByteOrder::Big, 0);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 5, b'h', b'e'][..]);
        assert!(c.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo");
        let frame = c.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut c = codec(2, ByteOrder::Little, 0);
        let mut buf = BytesMut::new();
        c.encode(&b"a"[..], &mut buf).unwrap();
        c.encode(&b"bc"[..], &mut buf).unwrap();
        assert_eq!(&buf[..3], &[1, 0, b'a']);

        assert_eq!(&c.decode(&mut buf).unwrap().unwrap()[..], b"a");
        assert_eq!(&c.decode(&mut buf).unwrap().unwrap()[..], b"bc");
        assert!(c.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut c = codec(4, ByteOrder::Big, 4);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 9][..]);
        assert!(matches!(
            c.decode(&mut buf),
            Err(FrameError::TooLarge { len: 9, max: 4 })
        ));
    }

    #[test]
    fn one_byte_header_caps_encoded_payload() {
        let mut c = codec(1, ByteOrder::Big, 0);
        let mut buf = BytesMut::new();
        let big = vec![b'x'; 256];
        assert!(c.encode(&big[..], &mut buf).is_err());
    }

    #[test]
    fn eof_inside_frame_is_truncated() {
        let mut c = codec(4, ByteOrder::Big, 0);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 3, b'a'][..]);
        assert!(matches!(
            c.decode_eof(&mut buf),
            Err(FrameError::Truncated { remaining: 5 })
        ));

        let mut empty = BytesMut::new();
        assert!(c.decode_eof(&mut empty).unwrap().is_none());
    }

    #[test]
    fn huge_header_does_not_reserve_the_whole_frame() {
        let mut c = codec(4, ByteOrder::Big, 0);
        let mut buf = BytesMut::from(&[0xffu8, 0xff, 0xff, 0xff][..]);
        assert!(c.decode(&mut buf).unwrap().is_none());
        assert!(buf.capacity() < 2 * MAX_RESERVE, "capacity {}", buf.capacity());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn frame_larger_than_one_reservation_still_decodes() {
        let mut c = codec(4, ByteOrder::Big, 0);
        let payload = vec![b'z'; MAX_RESERVE * 2 + 7];
        let mut wire = BytesMut::new();
        c.encode(&payload[..], &mut wire).unwrap();

        let mut buf = BytesMut::new();
        for chunk in wire.chunks(MAX_RESERVE / 2) {
            assert!(buf.is_empty() || c.decode(&mut buf).unwrap().is_none());
            buf.extend_from_slice(chunk);
        }
        let frame = c.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.len(), payload.len());
        assert!(buf.is_empty());
    }
}
