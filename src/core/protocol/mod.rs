//! Scope screen-dump wire format
//!
//! A dump is a text preamble followed by a binary body:
//!
//! 1. identifier line (`CSA803...` or `DIGITIZING SAMPLING OSCILLOSCOPE...`), LF terminated
//! 2. X resolution as decimal text, LF terminated
//! 3. Y resolution as decimal text, LF terminated
//! 4. a single NUL
//! 5. RLE pixel runs covering `X * Y` pixels (see [`rle`])

pub mod rle;

pub use rle::{decode_run, encode_run, PixelRun, MAX_REPEAT};

use std::fmt;
use std::ops::RangeInclusive;

/// Columns in a supported dump
pub const SCOPE_X_RES: u32 = 552;
/// Rows in a supported dump
pub const SCOPE_Y_RES: u32 = 704;

/// Plausible range for either reported dimension
pub const DIMENSION_RANGE: RangeInclusive<u32> = 1..=1000;

/// Identifier prefixes the header line must start with
pub const HEADER_IDENTIFIERS: [&str; 2] = ["CSA803", "DIGITIZING SAMPLING OSCILLOSCOPE"];

/// Longest header line kept while hunting for an identifier
pub const HEADER_LINE_CAP: usize = 100;
/// Bytes dropped from the tail when the header line exceeds its cap
pub const HEADER_LINE_TRIM: usize = 20;
/// Longest resolution line read
pub const DIMENSION_LINE_CAP: usize = 20;

/// Line terminator
pub const LINE_FEED: u8 = 0x0A;
/// Preamble terminator
pub const NUL: u8 = 0x00;

/// Runs delivered per batch
pub const RUN_BATCH_SIZE: usize = 25;

/// Check whether a header line identifies a supported scope
pub fn is_scope_header(line: &[u8]) -> bool {
    HEADER_IDENTIFIERS
        .iter()
        .any(|id| line.starts_with(id.as_bytes()))
}

/// Parse a resolution line. Anything that is not a decimal integer reads as 0.
pub fn parse_dimension(line: &[u8]) -> i64 {
    String::from_utf8_lossy(line).trim().parse().unwrap_or(0)
}

/// Check a parsed dimension against [`DIMENSION_RANGE`]
pub fn dimension_in_range(value: i64) -> Option<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| DIMENSION_RANGE.contains(v))
}

/// Image dimensions announced by the scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Columns
    pub x: u32,
    /// Rows
    pub y: u32,
}

impl Resolution {
    /// The only resolution the decoder accepts
    pub const SUPPORTED: Self = Self {
        x: SCOPE_X_RES,
        y: SCOPE_Y_RES,
    };

    /// Create a resolution
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Check if this is the supported resolution
    pub fn is_supported(&self) -> bool {
        *self == Self::SUPPORTED
    }

    /// Total pixels in the image
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.x) * u64::from(self.y)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}
