//! Core module containing the capture engine
//!
//! This module provides:
//! - Transport layer over real and in-memory serial ports
//! - Buffered byte reader tuned for the scope's bursty output
//! - Handshake constants and the RLE pixel-run codec
//! - The capture state machine and its worker thread
//! - Event delivery to the host
//! - Raster assembly, PNG export and a scope simulator
//! - Bounded operator log

pub mod byte_buffer;
pub mod error;
pub mod events;
pub mod logger;
pub mod protocol;
pub mod raster;
pub mod session;
pub mod simulator;
pub mod state_machine;
pub mod transport;
