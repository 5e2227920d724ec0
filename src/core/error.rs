//! Capture error taxonomy

use super::transport::TransportError;
use thiserror::Error;

/// Everything that can interrupt an acquisition. None of these stop the
/// worker; the state machine maps each one to a recovery transition.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The configured device could not be opened
    #[error("Unable to open serial port '{port}': {source}")]
    PortUnavailable {
        /// Device name
        port: String,
        /// Underlying failure
        #[source]
        source: TransportError,
    },

    /// Header or resolution lines did not look like a scope talking
    #[error("Unrecognized handshake: {0}")]
    HandshakeGarbage(String),

    /// Well-formed resolution other than the one we can decode
    #[error("Scope attempting to output {x}x{y} image -- only 552x704 currently supported.")]
    UnsupportedResolution {
        /// Columns reported by the scope
        x: u32,
        /// Rows reported by the scope
        y: u32,
    },

    /// Malformed RLE data
    #[error("Protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The stream stopped in the middle of a capture
    #[error("Timed out waiting for data")]
    DataTimeout,

    /// Nothing arrived within one read timeout
    #[error("Read timed out")]
    Timeout,

    /// The open port failed underneath us
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The worker thread could not be started
    #[error("Failed to spawn capture worker: {0}")]
    Spawn(#[source] std::io::Error),
}
