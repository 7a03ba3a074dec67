//! Error types for the trade gate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid signal: {message}")]
    InvalidSignal { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Arithmetic overflow in {operation}")]
    Arithmetic { operation: &'static str },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Build an overflow error for the named calculation.
    pub fn overflow(operation: &'static str) -> Self {
        Self::Arithmetic { operation }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
