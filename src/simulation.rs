use crate::grid::Grid;
use crate::shutdown::{LiveWorkers, ShutdownSignal};
use crate::worker::{worker_main, CellUpdate, CellWorker, DelayError, DelaySampler, WorkerState};
use colorsim_common::{GridSnapshot, ParameterError, RawParameters, SimulationParameters, WorkersConfig};
use log::{debug, error, info, warn};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error(transparent)]
    Parameters(#[from] ParameterError),

    #[error("a simulation is already running")]
    AlreadyRunning,

    #[error("no simulation is running")]
    NotRunning,

    #[error("delay range for k = {speed_ms} ms cannot be sampled: {source}")]
    Delay {
        speed_ms: u64,
        source: DelayError,
    },

    #[error("failed to spawn worker for cell ({row}, {col}): {source}")]
    Spawn {
        row: usize,
        col: usize,
        source: std::io::Error,
    },
}

/// Controller-side handle of one spawned worker.
struct WorkerHandle {
    row: usize,
    col: usize,
    join: JoinHandle<WorkerState>,
}

impl WorkerHandle {
    fn state(&self) -> WorkerState {
        if self.join.is_finished() {
            WorkerState::Cancelled
        } else {
            WorkerState::Running
        }
    }
}

/// Everything that lives exactly as long as one simulation run.
struct ActiveRun {
    params: SimulationParameters,
    grid: Arc<Grid>,
    signal: Arc<ShutdownSignal>,
    live: Arc<LiveWorkers>,
    workers: Vec<WorkerHandle>,
    started_at: Instant,
}

/// Outcome of [`SimulationController::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited and were joined.
    pub joined: usize,
    /// Workers that ended with a panic. Only their own cell stopped updating.
    pub panicked: usize,
    /// Workers still running when the join timeout expired. They exit on
    /// their own at the next wake-up but are no longer tracked.
    pub detached: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.panicked == 0 && self.detached == 0
    }
}

/// Owns the grid and the worker set of the current run.
pub struct SimulationController {
    workers_config: WorkersConfig,
    run: Option<ActiveRun>,
}

impl SimulationController {
    pub fn new(workers_config: WorkersConfig) -> Self {
        Self { workers_config, run: None }
    }

    /// Checks raw user input. Nothing is created when this fails.
    pub fn validate_parameters(raw: &RawParameters) -> Result<SimulationParameters, ParameterError> {
        raw.validate()
    }

    /// Validates `raw` and starts a run with it.
    pub fn start_from_text(&mut self, raw: &RawParameters, display: Sender<CellUpdate>) -> Result<(), SimulationError> {
        let params = Self::validate_parameters(raw)?;
        self.start(params, display)
    }

    /// Seeds a random grid and spawns one worker thread per cell. Either every
    /// worker starts or none is left running.
    pub fn start(&mut self, params: SimulationParameters, display: Sender<CellUpdate>) -> Result<(), SimulationError> {
        if self.run.is_some() {
            return Err(SimulationError::AlreadyRunning);
        }
        let delays = DelaySampler::new(&params)
            .map_err(|source| SimulationError::Delay { speed_ms: params.speed_ms, source })?;

        let started_at = Instant::now();
        let grid = Arc::new(Grid::new_random(params.rows, params.cols));
        let signal = Arc::new(ShutdownSignal::new());
        let live = LiveWorkers::new();
        let mut workers = Vec::with_capacity(params.cell_count());

        debug!("Simulation parameters: {:#?}", params);
        info!(
            "Starting {}x{} grid with {} workers (k = {} ms, p = {}).",
            params.rows,
            params.cols,
            params.cell_count(),
            params.speed_ms,
            params.randomize_probability
        );

        for row in 0..params.rows {
            for col in 0..params.cols {
                let worker = CellWorker::new(row, col, Arc::clone(&grid), params, delays.clone(), display.clone());
                let worker_signal = Arc::clone(&signal);
                let guard = live.enter();
                let spawned = thread::Builder::new()
                    .name(format!("cell-{}-{}", row, col))
                    .stack_size(self.workers_config.stack_size_bytes())
                    .spawn(move || worker_main(worker, worker_signal, guard));

                match spawned {
                    Ok(join) => workers.push(WorkerHandle { row, col, join }),
                    Err(source) => {
                        error!("Failed to spawn worker for cell ({}, {}): {}", row, col, source);
                        let partial = ActiveRun { params, grid, signal, live, workers, started_at };
                        let report = self.shut_down(partial);
                        warn!("Rolled back partial start: {:?}", report);
                        return Err(SimulationError::Spawn { row, col, source });
                    }
                }
            }
        }

        info!(
            "All {} workers running (startup took {:.2} ms).",
            workers.len(),
            started_at.elapsed().as_secs_f64() * 1000.0
        );
        self.run = Some(ActiveRun { params, grid, signal, live, workers, started_at });
        Ok(())
    }

    /// Pauses or resumes one cell. Returns the new suspended state.
    pub fn toggle_cell(&self, row: isize, col: isize) -> Result<bool, SimulationError> {
        let run = self.run.as_ref().ok_or(SimulationError::NotRunning)?;
        let suspended = run.grid.toggle_suspended(row, col);
        let (r, c) = run.grid.wrap(row, col);
        info!("Cell ({}, {}) {}.", r, c, if suspended { "suspended" } else { "resumed" });
        Ok(suspended)
    }

    /// Cancels every worker, waits for them up to the configured timeout and
    /// releases the grid. Calling it again, or without a run, does nothing.
    pub fn stop(&mut self) -> ShutdownReport {
        match self.run.take() {
            Some(run) => self.shut_down(run),
            None => {
                debug!("stop() called with no active simulation; nothing to do.");
                ShutdownReport::default()
            }
        }
    }

    fn shut_down(&self, run: ActiveRun) -> ShutdownReport {
        let total = run.workers.len();
        info!(
            "Stopping {} workers after {:.2} s...",
            total,
            run.started_at.elapsed().as_secs_f64()
        );
        run.signal.cancel();

        let still_alive = run.live.wait_drained(self.workers_config.join_timeout());
        if still_alive > 0 {
            warn!(
                "{} workers did not exit within {} ms.",
                still_alive, self.workers_config.join_timeout_ms
            );
        }

        // With the live count at zero every thread is past its loop, so joining
        // can only block for the last few instructions of each thread.
        let mut report = ShutdownReport::default();
        for handle in run.workers {
            if still_alive > 0 && handle.state() == WorkerState::Running {
                warn!("Detaching worker for cell ({}, {}).", handle.row, handle.col);
                report.detached += 1;
                continue;
            }
            match handle.join.join() {
                Ok(_) => report.joined += 1,
                Err(_) => {
                    error!("Worker for cell ({}, {}) panicked.", handle.row, handle.col);
                    report.panicked += 1;
                }
            }
        }

        info!(
            "Simulation stopped: {} joined, {} panicked, {} detached.",
            report.joined, report.panicked, report.detached
        );
        report
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Number of workers spawned for the current run (n x m), 0 when stopped.
    pub fn worker_count(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.workers.len())
    }

    /// Workers of the current run that have not exited.
    pub fn running_workers(&self) -> usize {
        self.run.as_ref().map_or(0, |run| {
            run.workers.iter().filter(|w| w.state() == WorkerState::Running).count()
        })
    }

    pub fn grid(&self) -> Option<&Arc<Grid>> {
        self.run.as_ref().map(|run| &run.grid)
    }

    pub fn params(&self) -> Option<&SimulationParameters> {
        self.run.as_ref().map(|run| &run.params)
    }

    pub fn snapshot(&self) -> Option<GridSnapshot> {
        self.run.as_ref().map(|run| run.grid.snapshot())
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
