//! CLI Module
//!
//! Provides command-line support:
//! - Exit codes for automation
//! - The capture consumer that turns engine events into PNG files
//! - Offline replay of recorded streams

pub mod consumer;
pub mod exit_codes;
pub mod replay;

pub use consumer::CaptureConsumer;
pub use replay::{replay, ReplaySummary};
pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
