//! # Tekcap Core Library
//!
//! Screen capture from Tektronix CSA803-family sampling oscilloscopes over
//! RS-232. The scope pushes a short text handshake followed by a run-length
//! encoded 552x704 image whenever its hardcopy button is pressed; this crate
//! listens for that stream and turns it into events a host can render.
//!
//! ## Features
//!
//! - Background capture worker with live port switching
//! - Recovery from garbage, unplugged adapters and truncated streams
//! - Raster assembly and PNG export
//! - In-memory ports and a scope simulator for testing without hardware
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tekcap_core::core::events::{CaptureEvent, ChannelSink};
//! use tekcap_core::core::session::{spawn_worker, SessionControl};
//! use tekcap_core::core::state_machine::CaptureTiming;
//! use tekcap_core::core::transport::{PortSession, PortSettings, SystemPortOpener};
//!
//! fn main() -> anyhow::Result<()> {
//!     let port = PortSession::new(Box::new(SystemPortOpener), PortSettings::default());
//!     let (sink, events) = ChannelSink::unbounded();
//!     let control = Arc::new(SessionControl::new("/dev/ttyUSB0"));
//!     let _worker = spawn_worker(port, sink, control, CaptureTiming::default())?;
//!
//!     for event in events {
//!         if let CaptureEvent::Log(text) = event {
//!             println!("{text}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CaptureConsumer, CliResult, ExitCodes};
pub use crate::config::AppConfig;
pub use crate::core::error::CaptureError;
pub use crate::core::events::{CaptureEvent, ChannelSink, EventSink};
pub use crate::core::logger::{LogEntry, OperatorLog, Severity};
pub use crate::core::protocol::{PixelRun, Resolution};
pub use crate::core::raster::{Raster, DEFAULT_PALETTE};
pub use crate::core::session::{spawn_worker, CaptureHandle, SessionControl};
pub use crate::core::state_machine::{CaptureEngine, CaptureState, CaptureTiming};
pub use crate::core::transport::{PortSession, PortSettings, SerialFlowControl, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
