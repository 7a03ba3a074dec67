//! Per-signal gate for opening new positions.

use crate::circuit_breaker::fmt_pct;
use chrono::{DateTime, NaiveDate, Utc};
use gate_core::{
    Clock, EvaluationResult, PositionOpeningConfig, RiskLevel, SystemClock, TradingSignal,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Daily loss bookkeeping, reset on the first evaluation of each UTC day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyLossTracker {
    pub last_reset_date: Option<NaiveDate>,
    /// Available capital captured at the reset.
    pub starting_capital: Decimal,
    /// Realized P&L recorded since the reset. Informational only.
    pub daily_pnl: Decimal,
}

/// Decides whether a single proposed position may be opened.
///
/// Sub-checks run in order and stop at the first failure:
/// daily loss, position count, confidence, capital.
pub struct PositionOpeningDecision {
    config: PositionOpeningConfig,
    tracker: RwLock<DailyLossTracker>,
    clock: Arc<dyn Clock>,
}

impl PositionOpeningDecision {
    pub fn new(config: PositionOpeningConfig) -> gate_core::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Rejects an invalid config before any signal is evaluated.
    pub fn with_clock(
        config: PositionOpeningConfig,
        clock: Arc<dyn Clock>,
    ) -> gate_core::Result<Self> {
        config.validate()?;

        info!(
            max_daily_loss_pct = %config.max_daily_loss_pct,
            max_positions = config.max_positions,
            min_confidence = %config.min_confidence,
            "Position opening decision initialized"
        );

        Ok(Self {
            config,
            tracker: RwLock::new(DailyLossTracker::default()),
            clock,
        })
    }

    pub fn config(&self) -> &PositionOpeningConfig {
        &self.config
    }

    /// Evaluate a signal. Any unexpected failure rejects with `CRITICAL`.
    pub async fn evaluate(
        &self,
        signal: &TradingSignal,
        available_capital: Decimal,
        current_positions: u32,
        market_bias: Option<&str>,
        market_regime: Option<&str>,
    ) -> EvaluationResult {
        let now = self.clock.now();
        let mut tracker = self.tracker.write().await;

        info!(
            symbol = %signal.symbol,
            direction = %signal.direction,
            entry_price = %signal.entry_price,
            confidence = %signal.confidence,
            available_capital = %available_capital,
            current_positions,
            market_bias = market_bias.unwrap_or("none"),
            market_regime = market_regime.unwrap_or("none"),
            "Evaluating position opening"
        );

        match self.evaluate_locked(&mut tracker, signal, available_capital, current_positions, now) {
            Ok(result) => result,
            Err(e) => {
                error!(symbol = %signal.symbol, error = %e, "Position evaluation failed, rejecting");
                EvaluationResult::reject(
                    format!("Evaluation error: {e}"),
                    RiskLevel::Critical,
                    BTreeMap::new(),
                    now,
                )
            }
        }
    }

    fn evaluate_locked(
        &self,
        tracker: &mut DailyLossTracker,
        signal: &TradingSignal,
        available_capital: Decimal,
        current_positions: u32,
        now: DateTime<Utc>,
    ) -> gate_core::Result<EvaluationResult> {
        signal.validate()?;

        let mut checks = BTreeMap::new();

        let daily = self.daily_loss_guarded(tracker, available_capital, now);
        checks.insert("daily_loss".to_string(), daily.approved);
        if !daily.approved {
            return Ok(EvaluationResult { checks, ..daily });
        }

        if current_positions >= self.config.max_positions {
            return Ok(EvaluationResult::reject(
                format!(
                    "Max positions reached ({}/{})",
                    current_positions, self.config.max_positions
                ),
                RiskLevel::High,
                checks,
                now,
            ));
        }
        checks.insert("position_limit".to_string(), true);

        if signal.confidence < self.config.min_confidence {
            return Ok(EvaluationResult::reject(
                format!(
                    "Low confidence ({:.2} < {})",
                    signal.confidence, self.config.min_confidence
                ),
                RiskLevel::Medium,
                checks,
                now,
            ));
        }
        checks.insert("confidence".to_string(), true);

        let required = signal.required_capital();
        if required > available_capital {
            return Ok(EvaluationResult::reject(
                format!(
                    "Insufficient capital (need {:.0}, have {:.0})",
                    required, available_capital
                ),
                RiskLevel::High,
                checks,
                now,
            ));
        }
        checks.insert("capital".to_string(), true);

        info!(symbol = %signal.symbol, "Position approved");
        Ok(EvaluationResult::approve(
            "All risk checks passed",
            RiskLevel::Low,
            checks,
            now,
        ))
    }

    /// Run only the daily loss sub-check.
    ///
    /// Fails open: if the check itself cannot be computed, the result is an
    /// approval at `MEDIUM` risk.
    pub async fn check_daily_loss(&self, available_capital: Decimal) -> EvaluationResult {
        let now = self.clock.now();
        let mut tracker = self.tracker.write().await;
        self.daily_loss_guarded(&mut tracker, available_capital, now)
    }

    fn daily_loss_guarded(
        &self,
        tracker: &mut DailyLossTracker,
        available_capital: Decimal,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        match self.daily_loss_locked(tracker, available_capital, now) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Daily loss check failed, allowing with caution");
                EvaluationResult::approve(
                    "Daily loss check failed, allowing with caution",
                    RiskLevel::Medium,
                    BTreeMap::new(),
                    now,
                )
            }
        }
    }

    fn daily_loss_locked(
        &self,
        tracker: &mut DailyLossTracker,
        available_capital: Decimal,
        now: DateTime<Utc>,
    ) -> gate_core::Result<EvaluationResult> {
        let today = now.date_naive();
        if tracker.last_reset_date != Some(today) {
            info!(
                previous_date = ?tracker.last_reset_date,
                current_date = %today,
                starting_capital = %available_capital,
                "New trading day, resetting daily loss tracking"
            );
            tracker.last_reset_date = Some(today);
            tracker.starting_capital = available_capital;
            tracker.daily_pnl = Decimal::ZERO;
        }

        let current_pnl = available_capital
            .checked_sub(tracker.starting_capital)
            .ok_or_else(|| gate_core::Error::overflow("daily pnl"))?;
        let loss_pct = if tracker.starting_capital > Decimal::ZERO {
            current_pnl
                .checked_div(tracker.starting_capital)
                .ok_or_else(|| gate_core::Error::overflow("daily loss fraction"))?
        } else {
            Decimal::ZERO
        };
        let limit = self.config.max_daily_loss_pct;
        let losing = current_pnl < Decimal::ZERO;

        debug!(current_pnl = %current_pnl, loss_pct = %loss_pct, "Daily P&L");

        if losing && loss_pct.abs() >= limit {
            warn!(loss_pct = %loss_pct, limit = %limit, "Daily loss limit reached");
            return Ok(EvaluationResult::reject(
                format!(
                    "Daily loss limit reached ({} >= {})",
                    fmt_pct(loss_pct)?,
                    fmt_pct(limit)?
                ),
                RiskLevel::Critical,
                BTreeMap::new(),
                now,
            ));
        }

        let risk_level = if losing && loss_pct.abs() >= limit * Decimal::new(8, 1) {
            warn!(loss_pct = %loss_pct, limit = %limit, "Approaching daily loss limit");
            RiskLevel::High
        } else if losing && loss_pct.abs() >= limit * Decimal::new(5, 1) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        Ok(EvaluationResult::approve(
            format!("Daily P&L within limits ({})", fmt_pct(loss_pct)?),
            risk_level,
            BTreeMap::new(),
            now,
        ))
    }

    /// Accumulate realized P&L for the current day.
    pub async fn record_pnl(&self, pnl: Decimal) {
        let mut tracker = self.tracker.write().await;
        tracker.daily_pnl = tracker.daily_pnl.saturating_add(pnl);
        info!(daily_pnl = %tracker.daily_pnl, "Daily P&L updated");
    }

    pub async fn daily_loss_snapshot(&self) -> DailyLossTracker {
        self.tracker.read().await.clone()
    }
}
