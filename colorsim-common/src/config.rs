use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::RawParameters;
use std::path::Path;
use std::time::Duration;

// Default simulation parameters, overridable from the command line
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ParametersConfig {
    pub rows: i64,
    pub cols: i64,
    pub speed_ms: i64,
    pub probability: f64,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        ParametersConfig {
            rows: 10,
            cols: 10,
            speed_ms: 100,
            probability: 0.1,
        }
    }
}

// Settings for the per-cell worker threads
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct WorkersConfig {
    #[serde(default = "default_stack_size_kb")]
    pub stack_size_kb: usize,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

// Settings for the headless display
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    #[serde(default)]
    pub run_for_secs: Option<u64>, // None = run until the user quits
    #[serde(default = "default_read_stdin")]
    pub read_stdin: bool,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        WorkersConfig {
            stack_size_kb: default_stack_size_kb(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            report_interval_ms: default_report_interval_ms(),
            run_for_secs: None,
            read_stdin: default_read_stdin(),
        }
    }
}

// Main configuration structure, loaded from config.toml. Every section is optional.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SimulationConfig {
    #[serde(default)]
    pub parameters: ParametersConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl SimulationConfig {
    /// Loads the configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and checks a TOML document. Simulation parameters are checked later,
    /// together with any command-line overrides.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;

        if config.workers.stack_size_kb < 16 {
            anyhow::bail!("workers.stack_size_kb must be at least 16.");
        }
        if config.workers.stack_size_kb > MAX_STACK_SIZE_KB {
            anyhow::bail!("workers.stack_size_kb must be at most {}.", MAX_STACK_SIZE_KB);
        }
        if config.display.report_interval_ms == 0 {
            anyhow::bail!("display.report_interval_ms must be greater than 0.");
        }

        Ok(config)
    }

    /// Renders the configured parameters as text so they go through the same
    /// validation as user input.
    pub fn raw_parameters(&self) -> RawParameters {
        let p = &self.parameters;
        RawParameters::new(
            p.rows.to_string(),
            p.cols.to_string(),
            p.speed_ms.to_string(),
            p.probability.to_string(),
        )
    }
}

impl WorkersConfig {
    pub fn stack_size_bytes(&self) -> usize {
        self.stack_size_kb.saturating_mul(1024)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl DisplayConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.run_for_secs.map(Duration::from_secs)
    }
}

// 1 GiB per worker thread
const MAX_STACK_SIZE_KB: usize = 1024 * 1024;

fn default_stack_size_kb() -> usize {
    128 // Workers only sleep and average four colors
}

fn default_join_timeout_ms() -> u64 {
    2000
}

fn default_report_interval_ms() -> u64 {
    1000
}

fn default_read_stdin() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SimulationConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.workers.join_timeout(), Duration::from_secs(2));
        assert_eq!(config.display.run_for(), None);
    }

    #[test]
    fn test_partial_sections() {
        let config = SimulationConfig::from_toml_str(
            r#"
            [parameters]
            rows = 4
            probability = 0.75

            [display]
            run_for_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.parameters.rows, 4);
        assert_eq!(config.parameters.cols, 10);
        assert_eq!(config.parameters.probability, 0.75);
        assert_eq!(config.display.run_for(), Some(Duration::from_secs(3)));
        assert!(config.display.read_stdin);
        assert_eq!(config.workers.stack_size_kb, 128);
    }

    #[test]
    fn test_rejects_tiny_stack() {
        let err = SimulationConfig::from_toml_str("[workers]\nstack_size_kb = 1\n").unwrap_err();
        assert!(err.to_string().contains("stack_size_kb"));
    }

    #[test]
    fn test_rejects_huge_stack() {
        let err = SimulationConfig::from_toml_str("[workers]\nstack_size_kb = 1048577\n").unwrap_err();
        assert!(err.to_string().contains("at most"));
        assert!(SimulationConfig::from_toml_str("[workers]\nstack_size_kb = 1048576\n").is_ok());
    }

    #[test]
    fn test_stack_size_bytes_saturates() {
        let workers = WorkersConfig { stack_size_kb: usize::MAX, join_timeout_ms: 0 };
        assert_eq!(workers.stack_size_bytes(), usize::MAX);
        assert_eq!(WorkersConfig::default().stack_size_bytes(), 128 * 1024);
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(SimulationConfig::from_toml_str("[parameters]\nrows = \"ten\"\n").is_err());
    }

    #[test]
    fn test_raw_parameters_round_through_validation() {
        let mut config = SimulationConfig::default();
        config.parameters.rows = 0;
        assert!(config.raw_parameters().validate().is_err());

        config.parameters.rows = 3;
        let params = config.raw_parameters().validate().unwrap();
        assert_eq!((params.rows, params.cols, params.speed_ms), (3, 10, 100));
        assert_eq!(params.randomize_probability, 0.1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = SimulationConfig::load("/nonexistent/colorsim.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
