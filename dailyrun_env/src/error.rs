//! Error types for the daily run environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// A calendar day could not be parsed (expects `YYYY-MM-DD`)
    #[error("Invalid day: {0}")]
    InvalidDay(String),
    
    /// A player identifier could not be parsed
    #[error("Invalid player id: {0}")]
    InvalidPlayerId(String),
}

impl EnvError {
    /// Creates an invalid-day error.
    pub fn invalid_day(input: impl Into<String>) -> Self {
        Self::InvalidDay(input.into())
    }
}
