pub mod color;
pub mod config;
pub mod error;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use color::Color;
pub use config::{DisplayConfig, ParametersConfig, SimulationConfig, WorkersConfig};
pub use error::ParameterError;
pub use sim_params::{RawParameters, SimulationParameters};
pub use snapshot::GridSnapshot;
