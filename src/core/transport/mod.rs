//! Transport layer for the capture engine
//!
//! The engine never talks to `serialport` directly. It owns a [`PortSession`],
//! which obtains [`PortIo`] handles from a [`PortOpener`]. The system opener
//! drives real serial devices; the in-memory opener stands in for a scope in
//! tests and when replaying recorded captures.

mod memory;
mod serial;

pub use memory::{MemoryFeed, MemoryOpener, MemoryPort};
pub use serial::{list_ports, SerialFlowControl, SystemPortOpener};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation on a session with no open handle
    #[error("Not connected")]
    NotConnected,

    /// Device went away underneath an open handle
    #[error("Disconnected")]
    Disconnected,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Line settings used for every open. The scope only speaks 8N1, so only the
/// rate, flow control and read timeout are adjustable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 19200,
            flow_control: SerialFlowControl::Hardware,
            read_timeout_ms: 250,
        }
    }
}

impl PortSettings {
    /// Per-read timeout as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// An open byte-oriented device handle.
pub trait PortIo: Send {
    /// Read up to `buf.len()` bytes, waiting at most one read timeout.
    /// A timeout with nothing received reads as `Ok(0)`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Number of bytes that can be read without waiting
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Discard anything the device has buffered for us
    fn clear_input(&mut self) -> Result<(), TransportError>;
}

/// Opens named devices.
pub trait PortOpener: Send {
    /// Open `name` with the given settings
    fn open(&mut self, name: &str, settings: &PortSettings) -> Result<Box<dyn PortIo>, TransportError>;
}

/// The worker's serial connection: a target device name plus, when open,
/// the handle for it. Created once per worker run.
pub struct PortSession {
    opener: Box<dyn PortOpener>,
    settings: PortSettings,
    name: String,
    port: Option<Box<dyn PortIo>>,
}

impl PortSession {
    /// Create a closed session with no target device
    pub fn new(opener: Box<dyn PortOpener>, settings: PortSettings) -> Self {
        Self {
            opener,
            settings,
            name: String::new(),
            port: None,
        }
    }

    /// Target device name (empty when none has been configured)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Line settings
    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    /// Check if a handle is open
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Open `name`, replacing any handle already held.
    pub fn open(&mut self, name: &str) -> Result<(), TransportError> {
        self.close();
        name.clone_into(&mut self.name);
        let port = self.opener.open(name, &self.settings)?;
        self.port = Some(port);
        Ok(())
    }

    /// Drop the handle, if any. The target name is kept.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::debug!(port = %self.name, "serial port closed");
        }
    }

    /// Retarget the session. Returns `true` when `name` differs from the
    /// current target, in which case the handle has been closed and the
    /// caller must go back through opening.
    pub fn switch_to(&mut self, name: &str) -> bool {
        if name == self.name {
            return false;
        }
        self.close();
        name.clone_into(&mut self.name);
        true
    }

    /// Read up to `buf.len()` bytes within one read timeout
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.handle()?.read(buf)
    }

    /// Bytes readable without waiting
    pub fn bytes_available(&mut self) -> Result<usize, TransportError> {
        self.handle()?.bytes_available()
    }

    /// Discard pending device input
    pub fn clear_input(&mut self) -> Result<(), TransportError> {
        self.handle()?.clear_input()
    }

    fn handle(&mut self) -> Result<&mut Box<dyn PortIo>, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(feed: &MemoryFeed) -> PortSession {
        let opener = MemoryOpener::new(feed.clone()).with_devices(["scope0", "scope1"]);
        PortSession::new(Box::new(opener), PortSettings::default())
    }

    #[test]
    fn test_open_and_read() {
        let feed = MemoryFeed::new();
        let mut session = session_with(&feed);
        assert!(!session.is_open());

        session.open("scope0").unwrap();
        assert!(session.is_open());
        assert_eq!(session.name(), "scope0");

        feed.push(b"abc");
        assert_eq!(session.bytes_available().unwrap(), 3);

        let mut buf = [0u8; 2];
        assert_eq!(session.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
    }

    #[test]
    fn test_open_unknown_device_fails() {
        let feed = MemoryFeed::new();
        let mut session = session_with(&feed);

        let result = session.open("ttyS9");
        assert!(matches!(result, Err(TransportError::PortNotFound(_))));
        assert!(!session.is_open());
        assert_eq!(session.name(), "ttyS9");
    }

    #[test]
    fn test_switch_to_same_name_is_noop() {
        let feed = MemoryFeed::new();
        let mut session = session_with(&feed);
        session.open("scope0").unwrap();

        assert!(!session.switch_to("scope0"));
        assert!(session.is_open());
    }

    #[test]
    fn test_switch_to_new_name_closes() {
        let feed = MemoryFeed::new();
        let mut session = session_with(&feed);
        session.open("scope0").unwrap();

        assert!(session.switch_to("scope1"));
        assert!(!session.is_open());
        assert_eq!(session.name(), "scope1");
    }

    #[test]
    fn test_read_when_closed() {
        let feed = MemoryFeed::new();
        let mut session = session_with(&feed);
        let mut buf = [0u8; 1];
        assert!(matches!(session.read(&mut buf), Err(TransportError::NotConnected)));
        assert!(matches!(session.bytes_available(), Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_default_settings() {
        let settings = PortSettings::default();
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.flow_control, SerialFlowControl::Hardware);
        assert_eq!(settings.read_timeout(), Duration::from_millis(250));
    }
}
