//! Failure taxonomy used to dispatch recovery actions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Class of external dependency failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, reset or dropped.
    Network,
    /// The dependency did not answer in time.
    Timeout,
    /// Request throttled by the remote side.
    RateLimited,
    /// Exchange rejected or failed the request.
    ExchangeApi,
    /// Market data feed unavailable or inconsistent.
    MarketData,
    Database,
    MessageBus,
    /// Credentials rejected or expired.
    Authentication,
    /// Request or response failed validation.
    Validation,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ExchangeApi => "exchange_api",
            FailureKind::MarketData => "market_data",
            FailureKind::Database => "database",
            FailureKind::MessageBus => "message_bus",
            FailureKind::Authentication => "authentication",
            FailureKind::Validation => "validation",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Errors that can report which class of failure they represent.
pub trait Classify {
    fn kind(&self) -> FailureKind;
}

/// General-purpose failure for callers without their own error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service} {kind} failure: {message}")]
pub struct ExternalFailure {
    pub kind: FailureKind,
    /// Name of the dependency that failed (e.g. "binance", "postgres").
    pub service: String,
    pub message: String,
}

impl ExternalFailure {
    pub fn new(kind: FailureKind, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            service: service.into(),
            message: message.into(),
        }
    }
}

impl Classify for ExternalFailure {
    fn kind(&self) -> FailureKind {
        self.kind
    }
}

impl Classify for std::io::Error {
    fn kind(&self) -> FailureKind {
        use std::io::ErrorKind;

        match std::io::Error::kind(self) {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FailureKind::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::AddrNotAvailable => FailureKind::Network,
            ErrorKind::PermissionDenied => FailureKind::Authentication,
            ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
                FailureKind::Validation
            }
            _ => FailureKind::Internal,
        }
    }
}
