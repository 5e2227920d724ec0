//! CLI Exit Codes
//!
//! Exit codes for scripted captures.

use crate::core::error::CaptureError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Port could not be opened
    pub const CONNECTION_FAILED: u8 = 3;

    /// No data
    pub const TIMEOUT: u8 = 4;

    /// Input or output file problem
    pub const FILE_ERROR: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Malformed capture stream
    pub const PROTOCOL_ERROR: u8 = 9;

    /// Stopped by the operator before finishing
    pub const CANCELLED: u8 = 11;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    pub fn success() -> Self {
        Self::Success(None)
    }

    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::CANCELLED, msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let code = match err.kind() {
            ErrorKind::NotFound => ExitCodes::FILE_ERROR,
            ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
            ErrorKind::TimedOut => ExitCodes::TIMEOUT,
            _ => ExitCodes::ERROR,
        };

        Self::Error(code, err.to_string())
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        let code = match err {
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            TransportError::ConnectionFailed(_)
            | TransportError::NotConnected
            | TransportError::Disconnected => ExitCodes::CONNECTION_FAILED,
            TransportError::IoError(_) => ExitCodes::ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&CaptureError> for CliResult {
    fn from(err: &CaptureError) -> Self {
        match err {
            CaptureError::PortUnavailable { source, .. } | CaptureError::Transport(source) => {
                Self::Error(Self::from(source).code(), err.to_string())
            }
            CaptureError::HandshakeGarbage(_)
            | CaptureError::UnsupportedResolution { .. }
            | CaptureError::ProtocolViolation(_) => Self::Error(ExitCodes::PROTOCOL_ERROR, err.to_string()),
            CaptureError::DataTimeout | CaptureError::Timeout => Self::Error(ExitCodes::TIMEOUT, err.to_string()),
            CaptureError::Spawn(_) => Self::Error(ExitCodes::ERROR, err.to_string()),
        }
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Timed out waiting for data",
        6 => "File error",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Protocol error",
        11 => "Operation cancelled",
        14 => "Port not found",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 6, 7, 8, 9, 11, 14] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
