//! Trade Gate: risk control and fault tolerance for automated trading
//!
//! This is the root crate that hosts integration tests and benchmarks.
//! For actual functionality, use the individual crates directly:
//!
//! - `gate-core`: Shared types, configuration loading, clock
//! - `recovery`: Retry policies and failure recovery dispatch
//! - `risk-manager`: Circuit breaker, position opening decision, trade gate
//! - `gate-monitor`: Snapshot replay binary

pub use gate_core as core;
pub use recovery;
pub use risk_manager as risk;
