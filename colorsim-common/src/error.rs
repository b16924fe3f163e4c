//! Parameter errors reported to the user before a simulation starts.

use thiserror::Error;

/// Why a set of simulation parameters was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// The text could not be parsed as the expected numeric type.
    #[error("malformed parameter {name}: {value:?} is not a valid number")]
    MalformedInput { name: &'static str, value: String },

    /// The value parsed but lies outside the accepted range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl ParameterError {
    #[must_use]
    pub fn malformed<S: Into<String>>(name: &'static str, value: S) -> Self {
        Self::MalformedInput { name, value: value.into() }
    }

    #[must_use]
    pub fn invalid<S: Into<String>>(name: &'static str, reason: S) -> Self {
        Self::InvalidParameter { name, reason: reason.into() }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedInput { .. })
    }
}
