//! Circuit breaker for system-wide trading halts.
//!
//! Every trading decision first passes through [`CircuitBreaker::check`],
//! which evaluates five rules in a fixed priority order against live
//! portfolio metrics. The first breach trips the breaker: it opens, blocks
//! all new activity for the cooldown period, then allows a single
//! probationary check (half-open) that either closes or re-opens it.

use chrono::{DateTime, Utc};
use gate_core::{CircuitBreakerConfig, Clock, EvaluationResult, RiskLevel, SystemClock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle state of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Trading permitted, rules active.
    Closed,
    /// Trading halted until the cooldown elapses.
    Open,
    /// Cooldown elapsed; the next check decides between closed and open.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Rule that tripped the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripRule {
    /// Daily P&L fell past the loss limit.
    DailyLossLimit,
    /// Portfolio value dropped too far within the window.
    RapidDrawdown,
    /// Too many open positions.
    PositionLimit,
    /// Losing trades in a row.
    ConsecutiveLosses,
    /// Current volatility too far above baseline.
    VolatilitySpike,
    /// Operator-initiated halt.
    Manual,
}

impl TripRule {
    /// Wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TripRule::DailyLossLimit => "DAILY_LOSS_LIMIT",
            TripRule::RapidDrawdown => "RAPID_DRAWDOWN",
            TripRule::PositionLimit => "POSITION_LIMIT",
            TripRule::ConsecutiveLosses => "CONSECUTIVE_LOSSES",
            TripRule::VolatilitySpike => "VOLATILITY_SPIKE",
            TripRule::Manual => "MANUAL",
        }
    }

    /// Key used for this rule in the per-check pass map.
    fn check_name(&self) -> &'static str {
        match self {
            TripRule::DailyLossLimit => "daily_loss",
            TripRule::RapidDrawdown => "rapid_drawdown",
            TripRule::PositionLimit => "position_limit",
            TripRule::ConsecutiveLosses => "consecutive_losses",
            TripRule::VolatilitySpike => "volatility_spike",
            TripRule::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TripRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current and baseline volatility, in the same unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityReading {
    pub current: Decimal,
    pub baseline: Decimal,
}

/// Live metrics supplied by the caller on every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// Total portfolio value; rules needing a ratio skip when not positive.
    pub portfolio_value: Decimal,
    /// Signed P&L since the start of the trading day.
    pub daily_pnl: Decimal,
    /// Positions currently open across the portfolio.
    pub open_positions: u32,
    /// P&L of the most recently closed trade, if one closed since the last check.
    #[serde(default)]
    pub last_trade_pnl: Option<Decimal>,
    /// Enables the volatility spike rule when present.
    #[serde(default)]
    pub volatility: Option<VolatilityReading>,
}

impl PortfolioMetrics {
    /// Metrics for the three core rules; the optional inputs start unset.
    pub fn new(portfolio_value: Decimal, daily_pnl: Decimal, open_positions: u32) -> Self {
        Self {
            portfolio_value,
            daily_pnl,
            open_positions,
            last_trade_pnl: None,
            volatility: None,
        }
    }

    pub fn with_last_trade_pnl(mut self, pnl: Decimal) -> Self {
        self.last_trade_pnl = Some(pnl);
        self
    }

    pub fn with_volatility(mut self, current: Decimal, baseline: Decimal) -> Self {
        self.volatility = Some(VolatilityReading { current, baseline });
        self
    }
}

/// One entry of the rapid-drawdown rolling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSample {
    pub timestamp: DateTime<Utc>,
    pub pnl: Decimal,
    pub portfolio_value: Decimal,
}

/// A recorded trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub rule: TripRule,
}

/// Mutable runtime state of the breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: BreakerState,
    /// Set while OPEN or HALF_OPEN; cooldown is measured from here.
    pub opened_at: Option<DateTime<Utc>>,
    pub opened_reason: Option<String>,
    /// Current losing streak; reset by a winning trade or a manual reset.
    pub consecutive_losses: u32,
    /// Samples inside the rapid-drawdown window, oldest first.
    pub recent_samples: VecDeque<PortfolioSample>,
    /// Every trip since construction, oldest first. Never truncated.
    pub trip_history: Vec<TripRecord>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            opened_at: None,
            opened_reason: None,
            consecutive_losses: 0,
            recent_samples: VecDeque::new(),
            trip_history: Vec::new(),
        }
    }
}

/// Result of a breaker check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerCheck {
    pub evaluation: EvaluationResult,
    /// Breaker state after the check.
    pub state: BreakerState,
    /// Rule that tripped on this call.
    pub rule: Option<TripRule>,
    /// Seconds left until HALF_OPEN, when blocked by an open breaker.
    pub cooldown_remaining_secs: Option<f64>,
    /// Configured cooldown, reported when this call tripped the breaker.
    pub cooldown_seconds: Option<i64>,
    /// Losing streak after this check.
    pub consecutive_losses: u32,
    /// Daily P&L over portfolio value, reported when all rules pass.
    pub daily_loss_pct: Option<Decimal>,
}

impl BreakerCheck {
    /// Whether new trading may proceed.
    pub fn allowed(&self) -> bool {
        self.evaluation.approved
    }

    pub fn reason(&self) -> &str {
        &self.evaluation.reason
    }
}

/// Operator-facing summary of the breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub state: BreakerState,
    pub opened_at: Option<DateTime<Utc>>,
    pub opened_reason: Option<String>,
    pub consecutive_losses: u32,
    /// Trips recorded since construction.
    pub trip_count: usize,
    /// Most recent trip, if any.
    pub last_trip: Option<TripRecord>,
    pub cooldown_seconds: i64,
}

/// Rule breach found during evaluation.
struct Breach {
    rule: TripRule,
    reason: String,
}

/// System-wide circuit breaker.
///
/// State is guarded by a single lock held for the whole of each check, so
/// concurrent callers are serialized per instance.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitBreakerState>,
    /// Fast path flag: set on trip, cleared by a check past the cooldown or a reset.
    is_open: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a breaker reading the system clock.
    pub fn new(config: CircuitBreakerConfig) -> gate_core::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a breaker on the given clock. Rejects an invalid config.
    pub fn with_clock(
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> gate_core::Result<Self> {
        config.validate()?;

        info!(
            max_daily_loss_pct = %config.max_daily_loss_pct,
            max_rapid_drawdown_pct = %config.max_rapid_drawdown_pct,
            max_positions = config.max_positions,
            max_consecutive_losses = config.max_consecutive_losses,
            cooldown_seconds = config.cooldown_seconds,
            "Circuit breaker initialized"
        );

        Ok(Self {
            config,
            state: RwLock::new(CircuitBreakerState::default()),
            is_open: AtomicBool::new(false),
            clock,
        })
    }

    /// Thresholds this breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether the breaker was open as of the last state change (lock-free).
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    /// Evaluate all rules and decide whether new trading is allowed.
    pub async fn check(&self, metrics: &PortfolioMetrics) -> BreakerCheck {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        if state.state == BreakerState::Open {
            let elapsed = state.opened_at.map(|opened| now - opened);
            match elapsed {
                Some(elapsed) if elapsed <= self.config.cooldown() => {
                    let remaining = self.config.cooldown() - elapsed;
                    let remaining_secs = remaining.num_milliseconds() as f64 / 1000.0;
                    let reason = format!(
                        "Circuit breaker OPEN: {}. Cooldown: {:.0}s",
                        state.opened_reason.as_deref().unwrap_or("unknown"),
                        remaining_secs
                    );
                    debug!(remaining_secs, "Check blocked by open circuit breaker");

                    return BreakerCheck {
                        evaluation: EvaluationResult::reject(
                            reason,
                            RiskLevel::Critical,
                            BTreeMap::new(),
                            now,
                        ),
                        state: BreakerState::Open,
                        rule: None,
                        cooldown_remaining_secs: Some(remaining_secs),
                        cooldown_seconds: None,
                        consecutive_losses: state.consecutive_losses,
                        daily_loss_pct: None,
                    };
                }
                _ => {
                    info!("Circuit breaker cooldown elapsed, entering HALF_OPEN state");
                    state.state = BreakerState::HalfOpen;
                    self.is_open.store(false, Ordering::SeqCst);
                }
            }
        }

        let mut checks = BTreeMap::new();
        let daily_loss_pct = match self.evaluate_rules(&mut state, metrics, now, &mut checks) {
            Ok(Ok(pct)) => pct,
            Ok(Err(breach)) => {
                checks.insert(breach.rule.check_name().to_string(), false);
                return self.trip_locked(&mut state, breach.rule, breach.reason, checks, now);
            }
            Err(e) => {
                // Evaluation could not complete: block this call without tripping
                error!(error = %e, "Circuit breaker evaluation failed, blocking trade");
                return BreakerCheck {
                    evaluation: EvaluationResult::reject(
                        format!("Circuit breaker evaluation error: {e}"),
                        RiskLevel::Critical,
                        checks,
                        now,
                    ),
                    state: state.state,
                    rule: None,
                    cooldown_remaining_secs: None,
                    cooldown_seconds: None,
                    consecutive_losses: state.consecutive_losses,
                    daily_loss_pct: None,
                };
            }
        };

        if state.state == BreakerState::HalfOpen {
            info!("Circuit breaker checks passed in HALF_OPEN state, closing breaker");
            state.state = BreakerState::Closed;
            state.opened_at = None;
            state.opened_reason = None;
        }

        BreakerCheck {
            evaluation: EvaluationResult::approve("All checks passed", RiskLevel::Low, checks, now),
            state: state.state,
            rule: None,
            cooldown_remaining_secs: None,
            cooldown_seconds: None,
            consecutive_losses: state.consecutive_losses,
            daily_loss_pct: Some(daily_loss_pct),
        }
    }

    /// Run the rules in priority order, stopping at the first breach.
    ///
    /// Returns the daily loss fraction when every rule passes.
    fn evaluate_rules(
        &self,
        state: &mut CircuitBreakerState,
        metrics: &PortfolioMetrics,
        now: DateTime<Utc>,
        checks: &mut BTreeMap<String, bool>,
    ) -> gate_core::Result<Result<Decimal, Breach>> {
        let config = &self.config;

        // Rule 1: daily loss
        let daily_loss_pct = if metrics.portfolio_value > Decimal::ZERO {
            metrics
                .daily_pnl
                .checked_div(metrics.portfolio_value)
                .ok_or_else(|| gate_core::Error::overflow("daily loss fraction"))?
        } else {
            Decimal::ZERO
        };
        if metrics.daily_pnl < Decimal::ZERO && daily_loss_pct.abs() >= config.max_daily_loss_pct {
            return Ok(Err(Breach {
                rule: TripRule::DailyLossLimit,
                reason: format!(
                    "Daily loss limit breached: {} (limit: {})",
                    fmt_pct(daily_loss_pct)?,
                    fmt_pct(config.max_daily_loss_pct)?
                ),
            }));
        }
        checks.insert(TripRule::DailyLossLimit.check_name().to_string(), true);

        // Rule 2: rapid drawdown over the rolling window
        state.recent_samples.push_back(PortfolioSample {
            timestamp: now,
            pnl: metrics.daily_pnl,
            portfolio_value: metrics.portfolio_value,
        });
        let cutoff = now - config.rapid_drawdown_window();
        while state
            .recent_samples
            .front()
            .is_some_and(|s| s.timestamp <= cutoff)
        {
            state.recent_samples.pop_front();
        }

        if state.recent_samples.len() >= 2 {
            let first_value = state.recent_samples[0].portfolio_value;
            let change = if first_value > Decimal::ZERO {
                (metrics
                    .portfolio_value
                    .checked_sub(first_value)
                    .ok_or_else(|| gate_core::Error::overflow("rapid drawdown"))?)
                    .checked_div(first_value)
                    .ok_or_else(|| gate_core::Error::overflow("rapid drawdown"))?
            } else {
                Decimal::ZERO
            };

            if change < Decimal::ZERO && change.abs() >= config.max_rapid_drawdown_pct {
                return Ok(Err(Breach {
                    rule: TripRule::RapidDrawdown,
                    reason: format!(
                        "Rapid drawdown: {} in {}min (limit: {})",
                        fmt_pct(change)?,
                        config.rapid_drawdown_window_minutes,
                        fmt_pct(config.max_rapid_drawdown_pct)?
                    ),
                }));
            }
        }
        checks.insert(TripRule::RapidDrawdown.check_name().to_string(), true);

        // Rule 3: open position count
        if metrics.open_positions >= config.max_positions {
            return Ok(Err(Breach {
                rule: TripRule::PositionLimit,
                reason: format!(
                    "Position limit reached: {} (limit: {})",
                    metrics.open_positions, config.max_positions
                ),
            }));
        }
        checks.insert(TripRule::PositionLimit.check_name().to_string(), true);

        // Rule 4: consecutive losing trades
        if let Some(last_trade_pnl) = metrics.last_trade_pnl {
            if last_trade_pnl < Decimal::ZERO {
                state.consecutive_losses = state.consecutive_losses.saturating_add(1);
            } else {
                state.consecutive_losses = 0;
            }

            if state.consecutive_losses >= config.max_consecutive_losses {
                return Ok(Err(Breach {
                    rule: TripRule::ConsecutiveLosses,
                    reason: format!(
                        "Consecutive losses: {} (limit: {})",
                        state.consecutive_losses, config.max_consecutive_losses
                    ),
                }));
            }
            checks.insert(TripRule::ConsecutiveLosses.check_name().to_string(), true);
        }

        // Rule 5: volatility spike
        if let Some(vol) = metrics.volatility.filter(|v| !v.baseline.is_zero()) {
            let increase = (vol
                .current
                .checked_sub(vol.baseline)
                .ok_or_else(|| gate_core::Error::overflow("volatility increase"))?)
                .checked_div(vol.baseline)
                .ok_or_else(|| gate_core::Error::overflow("volatility increase"))?;

            if increase >= config.max_volatility_spike_pct {
                return Ok(Err(Breach {
                    rule: TripRule::VolatilitySpike,
                    reason: format!(
                        "Volatility spike: {} increase (limit: {})",
                        fmt_pct(increase)?,
                        fmt_pct(config.max_volatility_spike_pct)?
                    ),
                }));
            }
            checks.insert(TripRule::VolatilitySpike.check_name().to_string(), true);
        }

        Ok(Ok(daily_loss_pct))
    }

    fn trip_locked(
        &self,
        state: &mut CircuitBreakerState,
        rule: TripRule,
        reason: String,
        checks: BTreeMap<String, bool>,
        now: DateTime<Utc>,
    ) -> BreakerCheck {
        error!(
            rule = %rule,
            reason = %reason,
            consecutive_losses = state.consecutive_losses,
            cooldown_seconds = self.config.cooldown_seconds,
            "Circuit breaker TRIPPED - trading halted"
        );

        state.state = BreakerState::Open;
        state.opened_at = Some(now);
        state.opened_reason = Some(reason.clone());
        state.trip_history.push(TripRecord {
            id: Uuid::new_v4(),
            timestamp: now,
            reason: reason.clone(),
            rule,
        });
        self.is_open.store(true, Ordering::SeqCst);

        BreakerCheck {
            evaluation: EvaluationResult::reject(reason, RiskLevel::Critical, checks, now),
            state: BreakerState::Open,
            rule: Some(rule),
            cooldown_remaining_secs: None,
            cooldown_seconds: Some(self.config.cooldown_seconds),
            consecutive_losses: state.consecutive_losses,
            daily_loss_pct: None,
        }
    }

    /// Manually trip the breaker, bypassing rule evaluation.
    pub async fn manual_trip(&self, reason: Option<String>) -> BreakerCheck {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let reason = reason.unwrap_or_else(|| "Manual emergency stop".to_string());

        warn!(reason = %reason, "Manual circuit breaker trip");
        self.trip_locked(&mut state, TripRule::Manual, reason, BTreeMap::new(), now)
    }

    /// Manually close the breaker and clear the loss streak.
    ///
    /// Trip history and the drawdown window are kept.
    pub async fn manual_reset(&self) {
        let mut state = self.state.write().await;

        warn!(
            previous_state = %state.state,
            consecutive_losses = state.consecutive_losses,
            "Circuit breaker MANUALLY RESET"
        );

        state.state = BreakerState::Closed;
        state.opened_at = None;
        state.opened_reason = None;
        state.consecutive_losses = 0;
        self.is_open.store(false, Ordering::SeqCst);
    }

    /// Snapshot of the full runtime state.
    pub async fn state(&self) -> CircuitBreakerState {
        self.state.read().await.clone()
    }

    /// Operator summary without the sample window.
    pub async fn status(&self) -> CircuitBreakerStatus {
        let state = self.state.read().await;
        CircuitBreakerStatus {
            state: state.state,
            opened_at: state.opened_at,
            opened_reason: state.opened_reason.clone(),
            consecutive_losses: state.consecutive_losses,
            trip_count: state.trip_history.len(),
            last_trip: state.trip_history.last().cloned(),
            cooldown_seconds: self.config.cooldown_seconds,
        }
    }

    /// The most recent `limit` trips, oldest first.
    pub async fn trip_history(&self, limit: usize) -> Vec<TripRecord> {
        let state = self.state.read().await;
        let start = state.trip_history.len().saturating_sub(limit);
        state.trip_history[start..].to_vec()
    }
}

/// Format a fraction as a percentage with two decimals.
pub(crate) fn fmt_pct(fraction: Decimal) -> gate_core::Result<String> {
    let pct = fraction
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| gate_core::Error::overflow("percentage"))?;
    Ok(format!("{pct:.2}%"))
}
