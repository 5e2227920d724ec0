//! Run-length encoding of pixel pairs
//!
//! Each run starts with a byte `RRBBBAAA`: `AAA` and `BBB` are palette
//! indices for the even and odd column of a pixel pair and `RR` is the
//! repeat count. `RR == 0` means the count follows in an extension byte;
//! an extension below 4 is the high byte of a 16-bit count whose low byte
//! comes next. A zero extension byte never appears in a valid stream.

use crate::core::error::CaptureError;
use std::fmt;

/// Largest repeat count the encoding can express
pub const MAX_REPEAT: u16 = (3 << 8) | 0xFF;

/// One decoded run: `repeat` consecutive pixel pairs `(color_a, color_b)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRun {
    /// Palette index of the even column (0..=7)
    pub color_a: u8,
    /// Palette index of the odd column (0..=7)
    pub color_b: u8,
    /// Number of pairs, at least 1
    pub repeat: u16,
}

impl PixelRun {
    /// Create a run
    pub fn new(color_a: u8, color_b: u8, repeat: u16) -> Self {
        Self {
            color_a,
            color_b,
            repeat,
        }
    }

    /// Pixels covered (two per pair)
    pub fn pixels(&self) -> u64 {
        2 * u64::from(self.repeat)
    }
}

impl fmt::Display for PixelRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})x{}", self.color_a, self.color_b, self.repeat)
    }
}

/// Decode one run whose leading byte is `first`, pulling extension bytes
/// from `next`.
pub fn decode_run<F>(first: u8, mut next: F) -> Result<PixelRun, CaptureError>
where
    F: FnMut() -> Result<u8, CaptureError>,
{
    let color_a = first & 0x07;
    let color_b = (first >> 3) & 0x07;
    let field = first >> 6;

    let repeat = if field == 0 {
        let extension = next()?;
        match extension {
            0 => return Err(CaptureError::ProtocolViolation("zero repeat count extension")),
            1..=3 => (u16::from(extension) << 8) + u16::from(next()?),
            _ => u16::from(extension),
        }
    } else {
        u16::from(field)
    };

    Ok(PixelRun::new(color_a, color_b, repeat))
}

/// Shortest encoding of `run`, appended to `out`. Returns `false` (and
/// writes nothing) if the repeat count is 0 or above [`MAX_REPEAT`].
pub fn encode_run(run: PixelRun, out: &mut Vec<u8>) -> bool {
    let colors = (run.color_a & 0x07) | ((run.color_b & 0x07) << 3);
    match run.repeat {
        r @ 1..=3 => {
            // r fits in the two high bits
            out.push(colors | ((r as u8) << 6));
        }
        r @ 4..=255 => {
            out.extend_from_slice(&[colors, r as u8]);
        }
        r @ 256..=MAX_REPEAT => {
            out.extend_from_slice(&[colors, (r >> 8) as u8, (r & 0xFF) as u8]);
        }
        _ => return false,
    }
    true
}
