//! Risk Manager
//!
//! Circuit breaker, position opening checks, and the composed trade gate.

pub mod circuit_breaker;
pub mod gate;
pub mod position_opening;

pub use circuit_breaker::{
    BreakerCheck, BreakerState, CircuitBreaker, CircuitBreakerState, CircuitBreakerStatus,
    PortfolioMetrics, PortfolioSample, TripRecord, TripRule, VolatilityReading,
};
pub use gate::{GateDecision, TradeGate};
pub use position_opening::{DailyLossTracker, PositionOpeningDecision};
