use crate::error::ParameterError;
use std::time::Duration;

/// Parameters exactly as the user typed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParameters {
    pub rows: String,
    pub cols: String,
    pub speed_ms: String,
    pub probability: String,
}

/// Validated simulation parameters, immutable for the lifetime of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParameters {
    // Grid
    pub rows: usize, // n
    pub cols: usize, // m

    // Timing
    pub speed_ms: u64, // k, mean delay between updates of one cell

    // Update rule
    pub randomize_probability: f64, // p
}

impl RawParameters {
    pub fn new(
        rows: impl Into<String>,
        cols: impl Into<String>,
        speed_ms: impl Into<String>,
        probability: impl Into<String>,
    ) -> Self {
        Self {
            rows: rows.into(),
            cols: cols.into(),
            speed_ms: speed_ms.into(),
            probability: probability.into(),
        }
    }

    /// Parses every field, then range-checks the result.
    /// Parsing errors win over range errors.
    pub fn validate(&self) -> Result<SimulationParameters, ParameterError> {
        let rows = parse_int("n", &self.rows)?;
        let cols = parse_int("m", &self.cols)?;
        let speed_ms = parse_int("k", &self.speed_ms)?;
        let probability = self
            .probability
            .trim()
            .parse::<f64>()
            .map_err(|_| ParameterError::malformed("p", self.probability.clone()))?;

        SimulationParameters::new(rows, cols, speed_ms, probability)
    }
}

fn parse_int(name: &'static str, text: &str) -> Result<i64, ParameterError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| ParameterError::malformed(name, text))
}

impl SimulationParameters {
    /// Range-checks numeric parameters: n > 0, m > 0, k > 0, 0 <= p <= 1.
    pub fn new(rows: i64, cols: i64, speed_ms: i64, probability: f64) -> Result<Self, ParameterError> {
        if rows <= 0 {
            return Err(ParameterError::invalid("n", format!("row count must be positive, got {}", rows)));
        }
        if cols <= 0 {
            return Err(ParameterError::invalid("m", format!("column count must be positive, got {}", cols)));
        }
        if speed_ms <= 0 {
            return Err(ParameterError::invalid("k", format!("speed must be positive, got {}", speed_ms)));
        }
        // NaN fails the range check as well
        if !(0.0..=1.0).contains(&probability) {
            return Err(ParameterError::invalid("p", format!("probability must be within [0, 1], got {}", probability)));
        }
        let rows = usize::try_from(rows).map_err(|_| ParameterError::invalid("n", "row count too large"))?;
        let cols = usize::try_from(cols).map_err(|_| ParameterError::invalid("m", "column count too large"))?;
        rows.checked_mul(cols)
            .ok_or_else(|| ParameterError::invalid("n", "grid size overflows"))?;

        Ok(Self {
            rows,
            cols,
            speed_ms: speed_ms as u64,
            randomize_probability: probability,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Shortest possible delay between two updates of one cell (0.5 k).
    pub fn min_delay(&self) -> Duration {
        Duration::from_micros(self.speed_ms.saturating_mul(500))
    }

    /// Upper bound (exclusive) of the delay between two updates (1.5 k).
    pub fn max_delay(&self) -> Duration {
        Duration::from_micros(self.speed_ms.saturating_mul(1500))
    }
}
