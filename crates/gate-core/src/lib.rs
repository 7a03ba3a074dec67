//! Gate Core Library
//!
//! Shared types, configuration and time source for the trade gate crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CircuitBreakerConfig, GateConfig, PositionOpeningConfig, RetrySettings};
pub use error::{Error, Result};
pub use types::{Direction, EvaluationResult, RiskLevel, TradingSignal};
