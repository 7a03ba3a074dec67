//! The composed trade gate: system-wide breaker first, then the per-signal decision.

use crate::circuit_breaker::{BreakerCheck, CircuitBreaker, PortfolioMetrics};
use crate::position_opening::PositionOpeningDecision;
use gate_core::{Clock, EvaluationResult, GateConfig, RiskLevel, SystemClock, TradingSignal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Outcome of [`TradeGate::authorize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub breaker: BreakerCheck,
    /// Present only when the breaker allowed trading.
    pub opening: Option<EvaluationResult>,
}

impl GateDecision {
    pub fn approved(&self) -> bool {
        self.breaker.allowed() && self.opening.as_ref().is_some_and(|o| o.approved)
    }

    /// Reason from the gate that made the final call.
    pub fn reason(&self) -> &str {
        match &self.opening {
            Some(opening) => &opening.reason,
            None => self.breaker.reason(),
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        match &self.opening {
            Some(opening) => opening.risk_level,
            None => self.breaker.evaluation.risk_level,
        }
    }
}

/// Owns one circuit breaker and one position opening decision.
pub struct TradeGate {
    breaker: CircuitBreaker,
    opening: PositionOpeningDecision,
}

impl TradeGate {
    pub fn new(config: &GateConfig) -> gate_core::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build both gates on a shared clock. Fails if either config is invalid.
    pub fn with_clock(config: &GateConfig, clock: Arc<dyn Clock>) -> gate_core::Result<Self> {
        Ok(Self {
            breaker: CircuitBreaker::with_clock(config.circuit_breaker.clone(), clock.clone())?,
            opening: PositionOpeningDecision::with_clock(config.position_opening.clone(), clock)?,
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn opening(&self) -> &PositionOpeningDecision {
        &self.opening
    }

    pub async fn authorize(
        &self,
        metrics: &PortfolioMetrics,
        signal: &TradingSignal,
        available_capital: Decimal,
        current_positions: u32,
        market_bias: Option<&str>,
        market_regime: Option<&str>,
    ) -> GateDecision {
        let breaker = self.breaker.check(metrics).await;
        if !breaker.allowed() {
            info!(
                symbol = %signal.symbol,
                reason = %breaker.reason(),
                "Trade blocked by circuit breaker"
            );
            return GateDecision {
                breaker,
                opening: None,
            };
        }

        let opening = self
            .opening
            .evaluate(
                signal,
                available_capital,
                current_positions,
                market_bias,
                market_regime,
            )
            .await;

        GateDecision {
            breaker,
            opening: Some(opening),
        }
    }
}
