//! Scope Simulator
//!
//! Produces the byte stream a scope sends for a given image, for tests,
//! benchmarks and the `simulate` command.

use super::protocol::{encode_run, PixelRun, HEADER_IDENTIFIERS, MAX_REPEAT, SCOPE_X_RES, SCOPE_Y_RES};
use super::raster::Raster;
use serde::{Deserialize, Serialize};

/// Synthetic images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPattern {
    /// Eight vertical bars, one per palette index
    Bars,
    /// 8x8 checkerboard of indices 0 and 7
    Checker,
    /// Every pixel the same index
    Solid(u8),
}

impl TestPattern {
    /// Render at the given size
    pub fn render(&self, width: u32, height: u32) -> Raster {
        let mut indices = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                let index = match self {
                    Self::Bars => (x * 8 / width.max(1)) as u8,
                    Self::Checker => {
                        if (x / 8 + y / 8) % 2 == 0 {
                            0
                        } else {
                            7
                        }
                    }
                    Self::Solid(index) => *index & 0x07,
                };
                indices.push(index);
            }
        }
        // Length matches width * height by construction
        Raster::from_indices(width, height, indices).unwrap_or_else(|| Raster::new(width, height))
    }
}

/// Generates capture streams
#[derive(Debug, Clone)]
pub struct ScopeSimulator {
    identifier: String,
    width: u32,
    height: u32,
}

impl Default for ScopeSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeSimulator {
    /// CSA803 announcing the supported resolution
    pub fn new() -> Self {
        Self {
            identifier: HEADER_IDENTIFIERS[0].to_string(),
            width: SCOPE_X_RES,
            height: SCOPE_Y_RES,
        }
    }

    /// Use a different identifier line
    #[must_use]
    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifier = identifier.to_string();
        self
    }

    /// Announce a different resolution
    #[must_use]
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Identifier line, both resolution lines and the NUL terminator
    pub fn preamble(&self) -> Vec<u8> {
        format!("{}\n{}\n{}\n\0", self.identifier, self.width, self.height).into_bytes()
    }

    /// Collapse a raster into runs of identical pixel pairs. A trailing odd
    /// pixel is paired with index 0.
    pub fn runs(raster: &Raster) -> Vec<PixelRun> {
        let mut runs: Vec<PixelRun> = Vec::new();
        for pair in raster.indices().chunks(2) {
            let a = pair[0] & 0x07;
            let b = pair.get(1).copied().unwrap_or(0) & 0x07;
            match runs.last_mut() {
                Some(last) if last.color_a == a && last.color_b == b && last.repeat < MAX_REPEAT => {
                    last.repeat += 1;
                }
                _ => runs.push(PixelRun::new(a, b, 1)),
            }
        }
        runs
    }

    /// Encode runs. Runs longer than the format allows are split.
    pub fn encode_runs(runs: &[PixelRun]) -> Vec<u8> {
        let mut out = Vec::with_capacity(runs.len() * 2);
        for run in runs {
            let mut left = run.repeat;
            while left > 0 {
                let chunk = left.min(MAX_REPEAT);
                encode_run(PixelRun::new(run.color_a, run.color_b, chunk), &mut out);
                left -= chunk;
            }
        }
        out
    }

    /// RLE body for `raster`
    pub fn body(&self, raster: &Raster) -> Vec<u8> {
        Self::encode_runs(&Self::runs(raster))
    }

    /// Complete capture stream: preamble followed by the body
    pub fn capture(&self, raster: &Raster) -> Vec<u8> {
        let mut out = self.preamble();
        out.extend(self.body(raster));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::decode_run;
    use crate::core::error::CaptureError;

    fn decode_all(bytes: &[u8]) -> Vec<PixelRun> {
        let mut iter = bytes.iter().copied();
        let mut runs = Vec::new();
        while let Some(first) = iter.next() {
            runs.push(decode_run(first, || iter.next().ok_or(CaptureError::Timeout)).unwrap());
        }
        runs
    }

    #[test]
    fn test_preamble() {
        assert_eq!(ScopeSimulator::new().preamble(), b"CSA803\n552\n704\n\0".to_vec());
        let sim = ScopeSimulator::new()
            .with_identifier("DIGITIZING SAMPLING OSCILLOSCOPE")
            .with_resolution(10, 20);
        assert_eq!(sim.preamble(), b"DIGITIZING SAMPLING OSCILLOSCOPE\n10\n20\n\0".to_vec());
    }

    #[test]
    fn test_solid_image_is_compact() {
        let raster = TestPattern::Solid(5).render(552, 704);
        let body = ScopeSimulator::new().body(&raster);
        // 194304 pairs split into runs of at most 1023, three bytes each
        assert_eq!(body.len(), 190 * 3);

        let runs = decode_all(&body);
        assert!(runs.iter().all(|r| r.color_a == 5 && r.color_b == 5));
        assert_eq!(runs.iter().map(PixelRun::pixels).sum::<u64>(), 552 * 704);
    }

    #[test]
    fn test_body_rebuilds_image() {
        for pattern in [TestPattern::Bars, TestPattern::Checker] {
            let raster = pattern.render(552, 704);
            let body = ScopeSimulator::new().body(&raster);

            let mut rebuilt = Raster::scope();
            rebuilt.apply_runs(&decode_all(&body));
            assert!(rebuilt.is_complete());
            assert_eq!(rebuilt, raster);
        }
    }

    #[test]
    fn test_long_runs_are_split() {
        let body = ScopeSimulator::encode_runs(&[PixelRun::new(1, 2, 3000)]);
        let runs = decode_all(&body);
        assert_eq!(runs.iter().map(|r| u32::from(r.repeat)).sum::<u32>(), 3000);
        assert!(runs.iter().all(|r| r.repeat <= MAX_REPEAT));
    }
}
