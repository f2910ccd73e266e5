//! Frame reassembly for stream-oriented transports.

use tracing::debug;

use crate::error::Result;
use crate::frame::Frame;

/// Buffers an incoming byte stream and yields complete frames.
///
/// Stream transports (TCP, Unix-domain sockets) deliver arbitrary chunks; the
/// transport contract requires whole frames. Feed every received chunk in,
/// then drain with [`next_frame`] until it returns `None`. A decode error is
/// fatal for the stream: the buffer contents are undefined afterwards and
/// the connection should be dropped.
///
/// [`next_frame`]: StreamReassembler::next_frame
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffer: Vec<u8>,
}

impl StreamReassembler {
    pub fn new() -> StreamReassembler {
        StreamReassembler::default()
    }

    /// Append a received chunk to the reassembly buffer.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes currently buffered and not yet consumed by a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The next complete frame, or `None` until more bytes arrive.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(required) = Frame::required_len(&self.buffer)? else {
            return Ok(None);
        };
        if self.buffer.len() < required {
            return Ok(None);
        }
        let (frame, consumed) = Frame::decode(&self.buffer)?;
        self.buffer.drain(..consumed);
        debug!(consumed, buffered = self.buffer.len(), "frame reassembled");
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::request(vec![0xDE, 0xAD]).with_header("method", "ping"),
            Frame::notification(Vec::new()),
            Frame::notification(vec![0x55; 100]),
        ]
    }

    #[test]
    fn test_reassembles_at_every_chunk_boundary() {
        let frames = sample_frames();
        let mut wire = Vec::new();
        for frame in &frames {
            wire.extend_from_slice(&frame.encode().unwrap());
        }

        for chunk_size in 1..=wire.len() {
            let mut reassembler = StreamReassembler::new();
            let mut received = Vec::new();
            for chunk in wire.chunks(chunk_size) {
                reassembler.feed(chunk);
                while let Some(frame) = reassembler.next_frame().unwrap() {
                    received.push(frame);
                }
            }
            assert_eq!(received, frames, "chunk size {chunk_size}");
            assert_eq!(reassembler.buffered(), 0, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_partial_frame_yields_none() {
        let bytes = Frame::request(vec![1, 2, 3]).encode().unwrap();
        let mut reassembler = StreamReassembler::new();
        reassembler.feed(&bytes[..bytes.len() - 1]);
        assert_eq!(reassembler.next_frame().unwrap(), None);
        reassembler.feed(&bytes[bytes.len() - 1..]);
        assert!(reassembler.next_frame().unwrap().is_some());
    }

    #[test]
    fn test_garbage_header_is_fatal() {
        let mut reassembler = StreamReassembler::new();
        reassembler.feed(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(reassembler.next_frame().is_err());
    }
}
