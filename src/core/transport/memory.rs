//! In-memory stand-in for a serial device
//!
//! A [`MemoryFeed`] is the "wire": whatever is pushed into it is what the
//! engine reads. Reads never wait; an empty feed reads as a timeout.

use super::{PortIo, PortOpener, PortSettings, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Default)]
struct FeedState {
    bytes: VecDeque<u8>,
    unplugged: bool,
}

/// Shared byte queue feeding one or more [`MemoryPort`]s
#[derive(Debug, Clone, Default)]
pub struct MemoryFeed {
    state: Arc<Mutex<FeedState>>,
}

impl MemoryFeed {
    /// Create an empty feed
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the wire
    pub fn push(&self, bytes: &[u8]) {
        self.state.lock().bytes.extend(bytes.iter().copied());
    }

    /// Bytes not yet read
    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    /// Check if everything has been read
    pub fn is_empty(&self) -> bool {
        self.state.lock().bytes.is_empty()
    }

    /// Simulate the device disappearing: open handles fail and opens are refused
    pub fn unplug(&self) {
        self.state.lock().unplugged = true;
    }

    /// Undo [`MemoryFeed::unplug`]
    pub fn plug_in(&self) {
        self.state.lock().unplugged = false;
    }
}

/// Handle onto a [`MemoryFeed`]
#[derive(Debug)]
pub struct MemoryPort {
    feed: MemoryFeed,
    discard_on_clear: bool,
    chunk_limit: Option<usize>,
}

impl MemoryPort {
    fn visible(&self, queued: usize) -> usize {
        self.chunk_limit.map_or(queued, |limit| queued.min(limit))
    }
}

impl PortIo for MemoryPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.feed.state.lock();
        if state.unplugged {
            return Err(TransportError::Disconnected);
        }
        let n = self.visible(buf.len().min(state.bytes.len()));
        for (slot, byte) in buf.iter_mut().zip(state.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        let state = self.feed.state.lock();
        if state.unplugged {
            return Err(TransportError::Disconnected);
        }
        Ok(self.visible(state.bytes.len()))
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        if self.discard_on_clear {
            self.feed.state.lock().bytes.clear();
        }
        Ok(())
    }
}

/// Opens [`MemoryPort`]s onto a shared feed
#[derive(Debug, Clone)]
pub struct MemoryOpener {
    feed: MemoryFeed,
    devices: Vec<String>,
    discard_on_clear: bool,
    chunk_limit: Option<usize>,
}

impl MemoryOpener {
    /// Opener that accepts any device name
    pub fn new(feed: MemoryFeed) -> Self {
        Self {
            feed,
            devices: Vec::new(),
            discard_on_clear: true,
            chunk_limit: None,
        }
    }

    /// Only accept the listed device names
    #[must_use]
    pub fn with_devices<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.devices = devices.into_iter().map(Into::into).collect();
        self
    }

    /// Keep queued bytes when the engine flushes input. A recorded stream
    /// has no stale input, so replays use this.
    #[must_use]
    pub fn keep_input_on_clear(mut self) -> Self {
        self.discard_on_clear = false;
        self
    }

    /// Hand out at most `limit` bytes per read and report no more than that
    /// as available, the way a slow line trickles data in. Keeps the engine
    /// from reading ahead past the end of one capture into the next.
    #[must_use]
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = Some(limit.max(1));
        self
    }
}

impl PortOpener for MemoryOpener {
    fn open(&mut self, name: &str, _settings: &PortSettings) -> Result<Box<dyn PortIo>, TransportError> {
        let known = self.devices.is_empty() || self.devices.iter().any(|d| d == name);
        if !known || self.feed.state.lock().unplugged {
            return Err(TransportError::PortNotFound(name.to_string()));
        }
        Ok(Box::new(MemoryPort {
            feed: self.feed.clone(),
            discard_on_clear: self.discard_on_clear,
            chunk_limit: self.chunk_limit,
        }))
    }
}
