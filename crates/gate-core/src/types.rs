//! Core domain types shared by the gates.

pub mod evaluation;
pub mod signal;

pub use evaluation::*;
pub use signal::*;
