//! Gate decision records returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Qualitative risk attached to a gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Outcome of a single gate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub approved: bool,
    pub reason: String,
    pub risk_level: RiskLevel,
    /// Sub-check name to pass/fail, for every sub-check that ran.
    pub checks: BTreeMap<String, bool>,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn new(
        approved: bool,
        reason: impl Into<String>,
        risk_level: RiskLevel,
        checks: BTreeMap<String, bool>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            approved,
            reason: reason.into(),
            risk_level,
            checks,
            timestamp,
        }
    }

    /// An approving result.
    pub fn approve(
        reason: impl Into<String>,
        risk_level: RiskLevel,
        checks: BTreeMap<String, bool>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(true, reason, risk_level, checks, timestamp)
    }

    /// A rejecting result.
    pub fn reject(
        reason: impl Into<String>,
        risk_level: RiskLevel,
        checks: BTreeMap<String, bool>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(false, reason, risk_level, checks, timestamp)
    }

    /// Whether the named sub-check ran and passed.
    pub fn passed(&self, check: &str) -> bool {
        self.checks.get(check).copied().unwrap_or(false)
    }
}
