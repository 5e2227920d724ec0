//! "Dancing dots" appended to status text while the engine waits

/// Cycles a run of dots between a minimum and maximum length, one step per
/// call, so a repeated status line visibly ticks over.
#[derive(Debug, Clone)]
pub struct WaitIndicator {
    min: usize,
    max: usize,
    glyph: char,
    current: usize,
}

impl Default for WaitIndicator {
    fn default() -> Self {
        Self::new(3, 13, '.')
    }
}

impl WaitIndicator {
    /// Create an indicator cycling `min..=max` copies of `glyph`
    pub fn new(min: usize, max: usize, glyph: char) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            glyph,
            current: min,
        }
    }

    /// Current dots, then advance
    pub fn next_dots(&mut self) -> String {
        let dots = std::iter::repeat(self.glyph).take(self.current).collect();
        self.current = if self.current >= self.max { self.min } else { self.current + 1 };
        dots
    }

    /// Restart from the minimum length
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
