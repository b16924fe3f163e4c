//! Headless stand-in for the graphical display.
//!
//! Owns its own copy of the frame and is the only consumer of worker updates,
//! so every update is applied on the display thread. User input arrives as
//! [`DisplayEvent`]s (from stdin in the binary) and is forwarded to the
//! controller.

use crate::simulation::{SimulationController, SimulationError};
use crate::worker::CellUpdate;
use colorsim_common::{Color, DisplayConfig, GridSnapshot};
use log::{info, warn};
use std::io::BufRead;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

// How long one pump waits for the first update before checking events again
const POLL_INTERVAL: Duration = Duration::from_millis(20);

// Cap on updates applied by one pump, so events and reports still run under load
const MAX_UPDATES_PER_PUMP: usize = 65_536;

/// User interaction delivered to the display loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Toggle { row: isize, col: isize },
    Print,
    Shutdown,
}

impl DisplayEvent {
    /// Parses one command line: `t <row> <col>`, `p`, or `q`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next()?;
        let event = match cmd {
            "t" | "toggle" => {
                let row = parts.next()?.parse().ok()?;
                let col = parts.next()?.parse().ok()?;
                DisplayEvent::Toggle { row, col }
            }
            "p" | "print" => DisplayEvent::Print,
            "q" | "quit" | "exit" => DisplayEvent::Shutdown,
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(event)
    }
}

/// Why the display loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    UserRequested,
    TimeElapsed,
    WorkersGone,
}

pub struct HeadlessDisplay {
    frame: GridSnapshot,
    updates: Receiver<CellUpdate>,
    events: Receiver<DisplayEvent>,
    config: DisplayConfig,
    updates_since_report: u64,
    total_updates: u64,
}

impl HeadlessDisplay {
    pub fn new(
        initial: GridSnapshot,
        updates: Receiver<CellUpdate>,
        events: Receiver<DisplayEvent>,
        config: DisplayConfig,
    ) -> Self {
        Self {
            frame: initial,
            updates,
            events,
            config,
            updates_since_report: 0,
            total_updates: 0,
        }
    }

    pub fn frame(&self) -> &GridSnapshot {
        &self.frame
    }

    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }

    fn apply(&mut self, update: CellUpdate) {
        let cols = self.frame.cols;
        if let Some(cell) = self.frame.cells.get_mut(update.row * cols + update.col) {
            *cell = update.color;
            self.updates_since_report += 1;
            self.total_updates += 1;
        }
    }

    /// Applies pending updates, waiting up to `timeout` for the first one.
    ///
    /// Draining stops once the queue is empty, `timeout` has passed since the
    /// first update, or `MAX_UPDATES_PER_PUMP` updates were applied. Whatever
    /// is left is picked up by the next call. Returns `false` once all workers
    /// have dropped their senders.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.updates.recv_timeout(timeout) {
            Ok(update) => self.apply(update),
            Err(RecvTimeoutError::Timeout) => return true,
            Err(RecvTimeoutError::Disconnected) => return false,
        }
        let drain_until = Instant::now() + timeout;
        for _ in 1..MAX_UPDATES_PER_PUMP {
            match self.updates.try_recv() {
                Ok(update) => self.apply(update),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
            if Instant::now() >= drain_until {
                break;
            }
        }
        true
    }

    /// Forwards pending user events. Returns `true` when shutdown was requested.
    fn handle_events(&mut self, controller: &SimulationController) -> bool {
        loop {
            match self.events.try_recv() {
                Ok(DisplayEvent::Toggle { row, col }) => match controller.toggle_cell(row, col) {
                    Ok(_) => {}
                    Err(SimulationError::NotRunning) => warn!("Ignoring toggle: simulation is not running."),
                    Err(e) => warn!("Toggle failed: {}", e),
                },
                Ok(DisplayEvent::Print) => info!("Current frame:\n{}", self.frame.to_ascii()),
                Ok(DisplayEvent::Shutdown) => return true,
                // No input source left; keep running until time or workers end it
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn report(&mut self, controller: &SimulationController, elapsed: Duration) {
        let rate = self.updates_since_report as f64 / elapsed.as_secs_f64().max(1e-9);
        let mean = self.frame.mean_color().unwrap_or_else(Color::black);
        let suspended = controller.grid().map_or(0, |g| g.suspended_count());
        info!(
            "Updates: {:8.1}/s | Total: {} | Mean color: ({:.3}, {:.3}, {:.3}) | Suspended: {}",
            rate, self.total_updates, mean.red, mean.green, mean.blue, suspended
        );
        self.updates_since_report = 0;
    }

    /// Runs until the user quits, `run_for` elapses, or every worker is gone.
    pub fn run(&mut self, controller: &SimulationController) -> ExitReason {
        let started = Instant::now();
        let deadline = self.config.run_for().map(|d| started + d);
        let report_every = self.config.report_interval();
        let mut last_report = started;

        loop {
            if !self.pump(POLL_INTERVAL) {
                return ExitReason::WorkersGone;
            }
            if self.handle_events(controller) {
                return ExitReason::UserRequested;
            }
            let now = Instant::now();
            if now.duration_since(last_report) >= report_every {
                self.report(controller, now.duration_since(last_report));
                last_report = now;
            }
            if deadline.is_some_and(|d| now >= d) {
                return ExitReason::TimeElapsed;
            }
        }
    }
}

/// Reads commands from stdin on a helper thread. The thread ends at EOF or
/// when the display stops listening.
pub fn spawn_stdin_reader(events: Sender<DisplayEvent>) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("stdin-reader".into()).spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match DisplayEvent::parse(&line) {
                Some(event) => {
                    if events.send(event).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command {:?}. Use `t <row> <col>`, `p` or `q`.", line.trim()),
            }
        }
    })
}
