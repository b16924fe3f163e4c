//! Toroidal grid of cell colors shared by all cell workers.
//!
//! Consistency contract: every cell has exactly one writer, its own worker.
//! All other workers only read it. Channels are stored as independent relaxed
//! atomics, so a reader racing a write may see a mix of old and new channels of
//! one neighbor. Neighbor averages are therefore computed from whatever values
//! are live at that instant; there is no double buffering and no lock.
//! Suspended flags are written by the controller and read by the owning
//! worker; a toggle may be observed one iteration late.

use atomic_float::AtomicF64;
use colorsim_common::{Color, GridSnapshot};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// One cell's color, one atomic per channel.
struct AtomicColor {
    red: AtomicF64,
    green: AtomicF64,
    blue: AtomicF64,
}

impl AtomicColor {
    fn new(color: Color) -> Self {
        Self {
            red: AtomicF64::new(color.red),
            green: AtomicF64::new(color.green),
            blue: AtomicF64::new(color.blue),
        }
    }

    #[inline(always)]
    fn load(&self) -> Color {
        Color::new(
            self.red.load(Ordering::Relaxed),
            self.green.load(Ordering::Relaxed),
            self.blue.load(Ordering::Relaxed),
        )
    }

    #[inline(always)]
    fn store(&self, color: Color) {
        self.red.store(color.red, Ordering::Relaxed);
        self.green.store(color.green, Ordering::Relaxed);
        self.blue.store(color.blue, Ordering::Relaxed);
    }
}

pub struct Grid {
    rows: usize,
    cols: usize,
    colors: Vec<AtomicColor>,
    suspended: Vec<AtomicBool>,
}

impl Grid {
    /// Creates a grid with every cell set to `fill`. Panics on a zero dimension;
    /// callers go through parameter validation first.
    pub fn new(rows: usize, cols: usize, fill: Color) -> Self {
        assert!(rows > 0 && cols > 0, "grid dimensions must be positive");
        let cells = rows * cols;
        Self {
            rows,
            cols,
            colors: (0..cells).map(|_| AtomicColor::new(fill)).collect(),
            suspended: (0..cells).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Creates a grid seeded with an independent random color per cell.
    pub fn new_random(rows: usize, cols: usize) -> Self {
        assert!(rows > 0 && cols > 0, "grid dimensions must be positive");
        let cells = rows * cols;
        let colors: Vec<AtomicColor> = (0..cells)
            .into_par_iter()
            .map_init(rand::rng, |rng, _| AtomicColor::new(Color::random_with(rng)))
            .collect();
        Self {
            rows,
            cols,
            colors,
            suspended: (0..cells).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Maps any (row, col), including negative or oversized values, onto the torus.
    #[inline(always)]
    pub fn wrap(&self, row: isize, col: isize) -> (usize, usize) {
        (
            row.rem_euclid(self.rows as isize) as usize,
            col.rem_euclid(self.cols as isize) as usize,
        )
    }

    #[inline(always)]
    fn index(&self, row: isize, col: isize) -> usize {
        let (r, c) = self.wrap(row, col);
        r * self.cols + c
    }

    pub fn get(&self, row: isize, col: isize) -> Color {
        self.colors[self.index(row, col)].load()
    }

    /// Overwrites a cell. Only the cell's own worker may call this while the
    /// simulation runs.
    pub fn set(&self, row: isize, col: isize, color: Color) {
        self.colors[self.index(row, col)].store(color);
    }

    /// Colors of the up, down, left and right neighbors.
    pub fn neighbors(&self, row: isize, col: isize) -> [Color; 4] {
        [
            self.get(row - 1, col),
            self.get(row + 1, col),
            self.get(row, col - 1),
            self.get(row, col + 1),
        ]
    }

    /// Flips the suspended flag and returns the new value.
    pub fn toggle_suspended(&self, row: isize, col: isize) -> bool {
        !self.suspended[self.index(row, col)].fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_suspended(&self, row: isize, col: isize) -> bool {
        self.suspended[self.index(row, col)].load(Ordering::Relaxed)
    }

    pub fn suspended_count(&self) -> usize {
        self.suspended.iter().filter(|s| s.load(Ordering::Relaxed)).count()
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            rows: self.rows,
            cols: self.cols,
            cells: self.colors.par_iter().map(AtomicColor::load).collect(),
            suspended: self.suspended_count(),
        }
    }
}
