use crate::grid::Grid;
use crate::shutdown::{LiveGuard, ShutdownSignal};
use colorsim_common::{Color, SimulationParameters};
use log::{debug, trace};
use rand::distr::Uniform;
use rand::prelude::*;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A freshly written cell color, sent from a worker to the display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellUpdate {
    pub row: usize,
    pub col: usize,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Cancelled,
}

/// What one iteration did to the cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The cell is suspended; nothing was read or written.
    Suspended,
    Randomized(Color),
    Averaged(Color),
}

#[derive(Error, Debug)]
pub enum DelayError {
    #[error("k = {0} ms does not fit in a nanosecond delay")]
    Overflow(u64),

    #[error(transparent)]
    Range(#[from] rand::distr::uniform::Error),
}

/// Samples the pause before each update, uniform in [0.5 k, 1.5 k) milliseconds
/// at nanosecond resolution.
#[derive(Debug, Clone)]
pub struct DelaySampler {
    nanos: Uniform<u64>,
}

impl DelaySampler {
    pub fn new(params: &SimulationParameters) -> Result<Self, DelayError> {
        let k = params.speed_ms;
        let (Some(low), Some(high)) = (k.checked_mul(500_000), k.checked_mul(1_500_000)) else {
            return Err(DelayError::Overflow(k));
        };
        Ok(Self { nanos: Uniform::new(low, high)? })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_nanos(rng.sample(&self.nanos))
    }
}

/// Drives the color of a single cell. Owns the only write access to that cell.
pub struct CellWorker {
    row: usize,
    col: usize,
    grid: Arc<Grid>,
    params: SimulationParameters,
    delays: DelaySampler,
    rng: StdRng,
    display: Sender<CellUpdate>,
    display_closed: bool,
}

impl CellWorker {
    pub fn new(
        row: usize,
        col: usize,
        grid: Arc<Grid>,
        params: SimulationParameters,
        delays: DelaySampler,
        display: Sender<CellUpdate>,
    ) -> Self {
        Self {
            row,
            col,
            grid,
            params,
            delays,
            rng: StdRng::from_rng(&mut rand::rng()),
            display,
            display_closed: false,
        }
    }

    /// Runs one update without sleeping: skip if suspended, otherwise pick a
    /// random color with probability p or the neighbor average, write it and
    /// tell the display.
    pub fn step(&mut self) -> StepOutcome {
        let (row, col) = (self.row as isize, self.col as isize);
        if self.grid.is_suspended(row, col) {
            return StepOutcome::Suspended;
        }

        let (color, outcome) = if self.rng.random::<f64>() < self.params.randomize_probability {
            let color = Color::random_with(&mut self.rng);
            (color, StepOutcome::Randomized(color))
        } else {
            let neighbors = self.grid.neighbors(row, col);
            let color = Color::average(&neighbors).unwrap_or_else(|| self.grid.get(row, col));
            (color, StepOutcome::Averaged(color))
        };

        self.grid.set(row, col, color);
        self.notify_display(color);
        outcome
    }

    fn notify_display(&mut self, color: Color) {
        let update = CellUpdate { row: self.row, col: self.col, color };
        if self.display.send(update).is_err() && !self.display_closed {
            debug!("Display channel closed; cell ({}, {}) keeps updating the grid only.", self.row, self.col);
            self.display_closed = true;
        }
    }

    /// Loops until `signal` is cancelled. Cancellation during the sleep ends
    /// the loop right away.
    pub fn run(mut self, signal: &ShutdownSignal) -> WorkerState {
        let name = std::thread::current().name().unwrap_or("cell").to_owned();
        loop {
            let delay = self.delays.sample(&mut self.rng);
            if signal.sleep(delay).is_err() {
                break;
            }
            trace!("Start: {}", name);
            let outcome = self.step();
            trace!("End: {} ({:?})", name, outcome);
        }
        debug!("Worker for cell ({}, {}) observed cancellation.", self.row, self.col);
        WorkerState::Cancelled
    }
}

/// Thread body of a spawned worker. `_live` is released when this returns or unwinds.
pub(crate) fn worker_main(worker: CellWorker, signal: Arc<ShutdownSignal>, _live: LiveGuard) -> WorkerState {
    worker.run(&signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::LiveWorkers;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    fn params(rows: i64, cols: i64, k: i64, p: f64) -> SimulationParameters {
        SimulationParameters::new(rows, cols, k, p).unwrap()
    }

    fn worker(grid: &Arc<Grid>, p: f64, row: usize, col: usize) -> (CellWorker, mpsc::Receiver<CellUpdate>) {
        let params = params(grid.rows() as i64, grid.cols() as i64, 10, p);
        let (tx, rx) = mpsc::channel();
        let delays = DelaySampler::new(&params).unwrap();
        (CellWorker::new(row, col, Arc::clone(grid), params, delays, tx), rx)
    }

    #[test]
    fn test_delay_for_k10_in_range() {
        let sampler = DelaySampler::new(&params(1, 1, 10, 0.5)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10_000 {
            let d = sampler.sample(&mut rng);
            assert!(d >= Duration::from_millis(5), "{:?}", d);
            assert!(d < Duration::from_millis(15), "{:?}", d);
        }
    }

    #[test]
    fn test_delay_rejects_k_beyond_nanosecond_range() {
        // 1.5 k ns overflows u64 above roughly 1.2e13 ms
        let err = DelaySampler::new(&params(1, 1, 20_000_000_000_000, 0.5)).unwrap_err();
        assert!(matches!(err, DelayError::Overflow(20_000_000_000_000)));
        assert!(DelaySampler::new(&params(1, 1, 12_000_000_000_000, 0.5)).is_ok());
    }

    #[test]
    fn test_average_step_uses_four_neighbors() {
        let grid = Arc::new(Grid::new(3, 3, Color::black()));
        grid.set(0, 1, Color::new(1.0, 0.0, 0.0)); // up of (1,1)
        grid.set(2, 1, Color::new(0.0, 1.0, 0.0)); // down
        grid.set(1, 0, Color::new(0.0, 0.0, 1.0)); // left
        grid.set(1, 2, Color::new(1.0, 1.0, 1.0)); // right
        let (mut w, rx) = worker(&grid, 0.0, 1, 1);

        let expected = Color::new(0.5, 0.5, 0.5);
        assert_eq!(w.step(), StepOutcome::Averaged(expected));
        assert_eq!(grid.get(1, 1), expected);
        assert_eq!(rx.try_recv().unwrap(), CellUpdate { row: 1, col: 1, color: expected });
    }

    #[test]
    fn test_randomize_step_with_p_one() {
        let grid = Arc::new(Grid::new(2, 2, Color::black()));
        let (mut w, rx) = worker(&grid, 1.0, 0, 1);
        match w.step() {
            StepOutcome::Randomized(c) => {
                assert!(c.is_valid());
                assert_eq!(grid.get(0, 1), c);
                assert_eq!(rx.try_recv().unwrap().color, c);
            }
            other => panic!("expected a random color, got {:?}", other),
        }
        // Other cells untouched
        assert_eq!(grid.get(0, 0), Color::black());
        assert_eq!(grid.get(1, 1), Color::black());
    }

    #[test]
    fn test_suspended_cell_keeps_color() {
        let grid = Arc::new(Grid::new_random(4, 4));
        let (mut w, rx) = worker(&grid, 1.0, 2, 3);
        let before = grid.get(2, 3);
        grid.toggle_suspended(2, 3);

        for _ in 0..50 {
            assert_eq!(w.step(), StepOutcome::Suspended);
        }
        assert_eq!(grid.get(2, 3), before);
        assert!(rx.try_recv().is_err());

        grid.toggle_suspended(2, 3);
        assert!(matches!(w.step(), StepOutcome::Randomized(_)));
        assert_eq!(rx.try_recv().unwrap().row, 2);
    }

    #[test]
    fn test_closed_display_does_not_stop_updates() {
        let grid = Arc::new(Grid::new(2, 2, Color::black()));
        let (mut w, rx) = worker(&grid, 1.0, 0, 0);
        drop(rx);
        assert!(matches!(w.step(), StepOutcome::Randomized(_)));
        assert!(matches!(w.step(), StepOutcome::Randomized(_)));
        assert!(w.display_closed);
    }

    #[test]
    fn test_run_exits_promptly_on_cancel() {
        let grid = Arc::new(Grid::new_random(2, 2));
        let params = params(2, 2, 10_000, 0.5); // ~10s between updates
        let (tx, _rx) = mpsc::channel();
        let w = CellWorker::new(0, 0, Arc::clone(&grid), params, DelaySampler::new(&params).unwrap(), tx);
        let signal = Arc::new(ShutdownSignal::new());
        let live = LiveWorkers::new();

        let handle = {
            let signal = Arc::clone(&signal);
            let guard = live.enter();
            thread::spawn(move || worker_main(w, signal, guard))
        };
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        signal.cancel();
        assert_eq!(handle.join().unwrap(), WorkerState::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(live.count(), 0);
    }

    #[test]
    fn test_run_updates_cell_over_time() {
        let grid = Arc::new(Grid::new(1, 1, Color::black()));
        let params = params(1, 1, 2, 1.0);
        let (tx, rx) = mpsc::channel();
        let w = CellWorker::new(0, 0, Arc::clone(&grid), params, DelaySampler::new(&params).unwrap(), tx);
        let signal = Arc::new(ShutdownSignal::new());

        let handle = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || w.run(&signal))
        };
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        signal.cancel();
        handle.join().unwrap();

        assert_eq!((first.row, first.col), (0, 0));
        assert!(first.color.is_valid());
        assert_ne!(grid.get(0, 0), Color::black());
    }
}
