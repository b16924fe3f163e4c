use crate::color::Color;

// Dark to bright, used by `to_ascii`
const LUMINANCE_RAMP: &[u8] = b" .:-=+*#%@";

/// A copy of every cell color at one moment, in row-major order.
/// Taken without stopping the workers, so cells may come from slightly
/// different instants.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Color>,
    /// Number of cells whose updates were paused at snapshot time.
    pub suspended: usize,
}

impl GridSnapshot {
    pub fn get(&self, row: usize, col: usize) -> Option<Color> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col).copied()
    }

    /// Mean color over the whole grid.
    pub fn mean_color(&self) -> Option<Color> {
        Color::average(&self.cells)
    }

    /// One character per cell, one line per row, brighter cells get denser glyphs.
    pub fn to_ascii(&self) -> String {
        let mut out = String::with_capacity(self.rows * (self.cols + 1));
        for row in self.cells.chunks(self.cols.max(1)) {
            for color in row {
                let level = (color.luminance().clamp(0.0, 1.0) * (LUMINANCE_RAMP.len() - 1) as f64).round() as usize;
                out.push(LUMINANCE_RAMP[level] as char);
            }
            out.push('\n');
        }
        out
    }
}
