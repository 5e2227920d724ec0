//! Read-ahead buffer between the serial port and the decoder
//!
//! The decoder consumes one byte at a time, which would be ruinous as one
//! port call per byte. [`ByteBuffer`] pulls whatever the port has ready in a
//! single read and hands it out byte by byte.

use super::error::CaptureError;
use super::transport::PortSession;

/// Consumed-prefix length at which the buffer is compacted
pub const COMPACT_THRESHOLD: usize = 100;

/// Buffered bytes plus a read cursor. `cursor <= buf.len()` always holds.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    buf: Vec<u8>,
    cursor: usize,
}

impl ByteBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything buffered
    pub fn reset(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    /// Bytes buffered but not yet returned
    pub fn pending(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Bytes obtainable without waiting: buffered plus whatever the port holds
    pub fn available(&self, port: &mut PortSession) -> Result<usize, CaptureError> {
        Ok(self.pending() + port.bytes_available()?)
    }

    /// Next byte from the stream.
    ///
    /// Refills from the port when the buffer is exhausted, taking everything
    /// the port has ready (at least one byte, waiting at most one read
    /// timeout). Fails with [`CaptureError::Timeout`] when nothing arrives.
    pub fn get_byte(&mut self, port: &mut PortSession) -> Result<u8, CaptureError> {
        if self.cursor >= COMPACT_THRESHOLD {
            self.compact();
        }

        if self.cursor == self.buf.len() {
            self.fill(port)?;
        }

        match self.buf.get(self.cursor) {
            Some(&byte) => {
                self.cursor += 1;
                Ok(byte)
            }
            None => Err(CaptureError::Timeout),
        }
    }

    fn fill(&mut self, port: &mut PortSession) -> Result<(), CaptureError> {
        let wanted = port.bytes_available()?.max(1);
        let start = self.buf.len();
        self.buf.resize(start + wanted, 0);
        match port.read(&mut self.buf[start..]) {
            Ok(n) => {
                self.buf.truncate(start + n);
                Ok(())
            }
            Err(e) => {
                self.buf.truncate(start);
                Err(e.into())
            }
        }
    }

    fn compact(&mut self) {
        self.buf.drain(..self.cursor);
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MemoryFeed, MemoryOpener, PortSettings};

    fn open_session(feed: &MemoryFeed) -> PortSession {
        let mut session = PortSession::new(Box::new(MemoryOpener::new(feed.clone())), PortSettings::default());
        session.open("scope").unwrap();
        session
    }

    #[test]
    fn test_timeout_on_empty_port() {
        let feed = MemoryFeed::new();
        let mut port = open_session(&feed);
        let mut buffer = ByteBuffer::new();

        assert!(matches!(buffer.get_byte(&mut port), Err(CaptureError::Timeout)));
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_pulls_everything_available_in_one_read() {
        let feed = MemoryFeed::new();
        let mut port = open_session(&feed);
        let mut buffer = ByteBuffer::new();

        feed.push(&[1, 2, 3, 4]);
        assert_eq!(buffer.get_byte(&mut port).unwrap(), 1);
        assert!(feed.is_empty());
        assert_eq!(buffer.pending(), 3);
        assert_eq!(buffer.available(&mut port).unwrap(), 3);
    }

    #[test]
    fn test_sequence_survives_compaction() {
        let feed = MemoryFeed::new();
        let mut port = open_session(&feed);
        let mut buffer = ByteBuffer::new();

        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        // Deliver in uneven chunks so compaction happens with unread bytes present
        let mut received = Vec::new();
        for chunk in data.chunks(37) {
            feed.push(chunk);
            for _ in 0..chunk.len() {
                received.push(buffer.get_byte(&mut port).unwrap());
                assert!(buffer.cursor <= buffer.buf.len());
                assert!(buffer.cursor <= COMPACT_THRESHOLD);
            }
        }

        assert_eq!(received, data);
        assert!(matches!(buffer.get_byte(&mut port), Err(CaptureError::Timeout)));
    }

    #[test]
    fn test_compaction_keeps_unread_tail() {
        let feed = MemoryFeed::new();
        let mut port = open_session(&feed);
        let mut buffer = ByteBuffer::new();

        let data: Vec<u8> = (0..150u8).collect();
        feed.push(&data);
        for expected in 0..100u8 {
            assert_eq!(buffer.get_byte(&mut port).unwrap(), expected);
        }
        assert_eq!(buffer.pending(), 50);

        // Compaction runs on this call; the next byte is still 100
        assert_eq!(buffer.get_byte(&mut port).unwrap(), 100);
        assert_eq!(buffer.cursor, 1);
        assert_eq!(buffer.pending(), 49);
    }

    #[test]
    fn test_reset_discards_buffered_bytes() {
        let feed = MemoryFeed::new();
        let mut port = open_session(&feed);
        let mut buffer = ByteBuffer::new();

        feed.push(b"xyz");
        assert_eq!(buffer.get_byte(&mut port).unwrap(), b'x');
        buffer.reset();
        assert_eq!(buffer.pending(), 0);

        feed.push(b"q");
        assert_eq!(buffer.get_byte(&mut port).unwrap(), b'q');
    }

    #[test]
    fn test_port_failure_propagates() {
        let feed = MemoryFeed::new();
        let mut port = open_session(&feed);
        let mut buffer = ByteBuffer::new();

        feed.unplug();
        assert!(matches!(buffer.get_byte(&mut port), Err(CaptureError::Transport(_))));
        assert_eq!(buffer.pending(), 0);
    }
}
