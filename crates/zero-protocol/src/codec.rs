//! Length-delimited multi-part framing over a byte stream.
//!
//! On the wire one message is:
//!
//! ```text
//! u32 frame count | (u32 length | bytes) * count
//! ```
//!
//! All integers are big-endian. A message whose encoded size exceeds the
//! codec's limit is rejected on both sides.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::ProtocolError;

/// One multi-part message.
pub type Multipart = Vec<Bytes>;

/// Default maximum encoded message size (4 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Codec turning a byte stream into [`Multipart`] messages.
#[derive(Debug, Clone)]
pub struct MultipartCodec {
    max_message_size: usize,
}

impl MultipartCodec {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

impl Default for MultipartCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MultipartCodec {
    type Item = Multipart;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let count = read_u32(src, 0) as usize;
        let mut offset = HEADER_LEN;
        self.check_size(offset.saturating_add(count.saturating_mul(HEADER_LEN)))?;

        // Walk the frame headers without consuming so a partial message
        // stays buffered until the rest arrives.
        let mut lengths = Vec::with_capacity(frame_capacity(count, src.len() - HEADER_LEN));
        for _ in 0..count {
            if src.len() < offset + HEADER_LEN {
                src.reserve(offset + HEADER_LEN - src.len());
                return Ok(None);
            }
            let len = read_u32(src, offset) as usize;
            offset += HEADER_LEN;
            self.check_size(offset.saturating_add(len))?;
            if src.len() < offset + len {
                src.reserve(offset + len - src.len());
                return Ok(None);
            }
            lengths.push(len);
            offset += len;
        }

        let mut message = src.split_to(offset);
        message.advance(HEADER_LEN);

        let mut frames = Vec::with_capacity(count);
        for len in lengths {
            message.advance(HEADER_LEN);
            frames.push(message.split_to(len).freeze());
        }
        Ok(Some(frames))
    }
}

impl Encoder<Multipart> for MultipartCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Multipart, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = HEADER_LEN
            + item
                .iter()
                .map(|frame| HEADER_LEN + frame.len())
                .sum::<usize>();
        self.check_size(size)?;

        let count = u32::try_from(item.len()).map_err(|_| ProtocolError::MessageTooLarge {
            size,
            max: self.max_message_size,
        })?;

        dst.reserve(size);
        dst.put_u32(count);
        for frame in item {
            // Bounded by check_size above, which is far below u32::MAX in practice
            dst.put_u32(frame.len() as u32);
            dst.extend_from_slice(&frame);
        }
        Ok(())
    }
}

fn read_u32(src: &BytesMut, at: usize) -> u32 {
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&src[at..at + HEADER_LEN]);
    u32::from_be_bytes(raw)
}

/// Capacity to reserve for `count` announced frames; the count is untrusted,
/// so never more than `buffered` bytes could describe.
fn frame_capacity(count: usize, buffered: usize) -> usize {
    count.min(buffered / HEADER_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(parts: &[&[u8]]) -> Multipart {
        parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    #[test]
    fn test_encode_decode() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(frames(&[b"title", b"", b"payload"]), &mut buf)
            .unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, frames(&[b"title", b"", b"payload"]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_announced_count_does_not_drive_allocation() {
        assert_eq!(frame_capacity(1_000_000, 0), 0);
        assert_eq!(frame_capacity(1_000_000, 12), 3);
        assert_eq!(frame_capacity(2, 400), 2);

        // Within the size limit, but none of the frames have arrived yet
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(1_000_000);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_LEN);
    }

    #[test]
    fn test_partial_message_waits_for_more() {
        let mut codec = MultipartCodec::new();
        let mut full = BytesMut::new();
        codec.encode(frames(&[b"abc", b"defgh"]), &mut full).unwrap();

        let mut partial = full.split_to(full.len() - 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(&decoded[1][..], b"defgh");
    }

    #[test]
    fn test_two_messages_in_one_buffer() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frames(&[b"one"]), &mut buf).unwrap();
        codec.encode(frames(&[b"two"]), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), frames(&[b"one"]));
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), frames(&[b"two"]));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut codec = MultipartCodec::with_max_message_size(16);
        let mut buf = BytesMut::new();

        let err = codec.encode(frames(&[&[0u8; 32]]), &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));

        // A header announcing a huge frame is rejected before buffering it
        let mut incoming = BytesMut::new();
        incoming.put_u32(1);
        incoming.put_u32(1_000);
        let err = codec.decode(&mut incoming).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
    }
}
