//! Snapshot replay through the trade gate.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use gate_core::{GateConfig, ManualClock, TradingSignal};
use risk_manager::{
    BreakerCheck, CircuitBreakerStatus, GateDecision, PortfolioMetrics, TradeGate, TripRecord,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Operator action carried by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OperatorCommand {
    Trip {
        #[serde(default)]
        reason: Option<String>,
    },
    Reset,
}

/// One line of replay input.
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub metrics: PortfolioMetrics,
    /// Required whenever `signal` is present.
    #[serde(default)]
    pub available_capital: Option<Decimal>,
    /// Defaults to the open position count in `metrics`.
    #[serde(default)]
    pub current_positions: Option<u32>,
    #[serde(default)]
    pub signal: Option<TradingSignal>,
    #[serde(default)]
    pub market_bias: Option<String>,
    #[serde(default)]
    pub market_regime: Option<String>,
    /// Realized P&L to record before evaluating.
    #[serde(default)]
    pub realized_pnl: Option<Decimal>,
    #[serde(default)]
    pub command: Option<OperatorCommand>,
}

/// Output line for one processed snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    Decision {
        timestamp: DateTime<Utc>,
        symbol: String,
        approved: bool,
        decision: GateDecision,
    },
    Breaker {
        timestamp: DateTime<Utc>,
        check: BreakerCheck,
    },
    Command {
        timestamp: DateTime<Utc>,
        command: OperatorCommand,
        status: CircuitBreakerStatus,
    },
}

/// Final report written after all snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub processed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub status: CircuitBreakerStatus,
    pub trip_history: Vec<TripRecord>,
}

/// Parse JSON-lines input, skipping blank lines.
///
/// A snapshot carrying a signal must also carry `available_capital`.
pub fn parse_snapshots(input: &str) -> Result<Vec<Snapshot>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| -> Result<Snapshot> {
            let snapshot: Snapshot = serde_json::from_str(line)
                .with_context(|| format!("invalid snapshot on line {}", idx + 1))?;
            if snapshot.signal.is_some() && snapshot.available_capital.is_none() {
                return Err(anyhow!(
                    "snapshot on line {} has a signal but no available_capital",
                    idx + 1
                ));
            }
            Ok(snapshot)
        })
        .collect()
}

/// Drives a [`TradeGate`] with the clock pinned to snapshot timestamps.
pub struct Replay {
    gate: TradeGate,
    clock: Arc<ManualClock>,
    processed: usize,
    approved: usize,
    rejected: usize,
}

impl Replay {
    pub fn new(config: &GateConfig, start: DateTime<Utc>) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(start));
        Ok(Self {
            gate: TradeGate::with_clock(config, clock.clone())?,
            clock,
            processed: 0,
            approved: 0,
            rejected: 0,
        })
    }

    pub fn gate(&self) -> &TradeGate {
        &self.gate
    }

    pub async fn apply(&mut self, snapshot: Snapshot) -> Result<ReplayEvent> {
        let timestamp = snapshot.timestamp;
        self.clock.set(timestamp);
        self.processed += 1;

        if let Some(pnl) = snapshot.realized_pnl {
            self.gate.opening().record_pnl(pnl).await;
        }

        if let Some(command) = snapshot.command {
            info!(command = ?command, %timestamp, "Applying operator command");
            match &command {
                OperatorCommand::Trip { reason } => {
                    self.gate.breaker().manual_trip(reason.clone()).await;
                }
                OperatorCommand::Reset => self.gate.breaker().manual_reset().await,
            }
            return Ok(ReplayEvent::Command {
                timestamp,
                command,
                status: self.gate.breaker().status().await,
            });
        }

        let Some(signal) = snapshot.signal else {
            let check = self.gate.breaker().check(&snapshot.metrics).await;
            self.tally(check.allowed());
            return Ok(ReplayEvent::Breaker { timestamp, check });
        };
        let available_capital = snapshot.available_capital.ok_or_else(|| {
            anyhow!("snapshot at {timestamp} has a signal but no available_capital")
        })?;

        let positions = snapshot
            .current_positions
            .unwrap_or(snapshot.metrics.open_positions);
        let decision = self
            .gate
            .authorize(
                &snapshot.metrics,
                &signal,
                available_capital,
                positions,
                snapshot.market_bias.as_deref(),
                snapshot.market_regime.as_deref(),
            )
            .await;
        let approved = decision.approved();
        self.tally(approved);
        debug!(symbol = %signal.symbol, approved, reason = %decision.reason(), "Decision");

        Ok(ReplayEvent::Decision {
            timestamp,
            symbol: signal.symbol,
            approved,
            decision,
        })
    }

    fn tally(&mut self, approved: bool) {
        if approved {
            self.approved += 1;
        } else {
            self.rejected += 1;
        }
    }

    pub async fn summary(&self, history: usize) -> ReplaySummary {
        ReplaySummary {
            processed: self.processed,
            approved: self.approved,
            rejected: self.rejected,
            status: self.gate.breaker().status().await,
            trip_history: self.gate.breaker().trip_history(history).await,
        }
    }
}
