//! Recovery
//!
//! Retry engine for calls to unreliable external dependencies (exchange
//! APIs, databases, message buses).
//!
//! - [`RetryPolicy`] - validated exponential backoff schedule with optional jitter
//! - [`RecoveryManager`] - runs an operation under a policy, dispatching
//!   registered recovery actions by [`FailureKind`] between attempts

pub mod failure;
pub mod manager;
pub mod policy;

pub use failure::{Classify, ExternalFailure, FailureKind};
pub use manager::RecoveryManager;
pub use policy::{PolicyError, RetryPolicy, RetryPolicyBuilder};
