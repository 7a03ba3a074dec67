//! Integration tests for component interactions.
//!
//! These tests verify that the gates, configuration and recovery work together.

use chrono::{Duration, TimeZone, Utc};
use gate_core::{Direction, GateConfig, ManualClock, RiskLevel, TradingSignal};
use recovery::{ExternalFailure, FailureKind, RecoveryManager, RetryPolicy};
use risk_manager::{BreakerState, PortfolioMetrics, TradeGate, TripRule};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn market_open() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 13, 30, 0).unwrap()
}

fn signal(confidence: i64) -> TradingSignal {
    TradingSignal::new(
        "SOL-USDT",
        Direction::Long,
        Decimal::new(150, 0),
        Decimal::new(confidence, 2),
        Decimal::new(2_000, 0),
    )
}

fn healthy(open_positions: u32) -> PortfolioMetrics {
    PortfolioMetrics::new(Decimal::new(100_000, 0), Decimal::new(250, 0), open_positions)
}

/// Test that thresholds loaded from a config file drive both gates.
#[tokio::test]
async fn test_file_config_drives_gate() {
    use std::io::Write;

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[circuit_breaker]\nmax_positions = 3\n\n[position_opening]\nmax_positions = 2"
    )
    .unwrap();

    let config = GateConfig::load(Some(file.path())).unwrap();
    let gate = TradeGate::with_clock(&config, Arc::new(ManualClock::new(market_open()))).unwrap();

    // Two positions: breaker fine, opening gate at its own limit
    let decision = gate
        .authorize(&healthy(2), &signal(80), Decimal::new(50_000, 0), 2, None, None)
        .await;
    assert!(decision.breaker.allowed());
    assert!(!decision.approved());
    assert_eq!(decision.reason(), "Max positions reached (2/2)");

    // Three positions trips the breaker itself
    let decision = gate
        .authorize(&healthy(3), &signal(80), Decimal::new(50_000, 0), 3, None, None)
        .await;
    assert_eq!(decision.breaker.rule, Some(TripRule::PositionLimit));
}

/// Test a losing streak through trip, cooldown and half-open recovery.
#[tokio::test]
async fn test_losing_streak_lifecycle() {
    let clock = Arc::new(ManualClock::new(market_open()));
    let gate = TradeGate::with_clock(&GateConfig::default(), clock.clone()).unwrap();
    let capital = Decimal::new(50_000, 0);

    let loss = healthy(1).with_last_trade_pnl(Decimal::new(-10, 0));
    for _ in 0..4 {
        let decision = gate.authorize(&loss, &signal(90), capital, 1, None, None).await;
        assert!(decision.approved());
        clock.advance(Duration::seconds(30));
    }

    let decision = gate.authorize(&loss, &signal(90), capital, 1, None, None).await;
    assert!(!decision.approved());
    assert_eq!(decision.breaker.rule, Some(TripRule::ConsecutiveLosses));
    assert_eq!(decision.risk_level(), RiskLevel::Critical);

    // Every call inside the cooldown is blocked, whatever the metrics
    for _ in 0..5 {
        clock.advance(Duration::seconds(50));
        let decision = gate.authorize(&healthy(0), &signal(99), capital, 0, None, None).await;
        assert!(!decision.approved());
        assert_eq!(decision.breaker.state, BreakerState::Open);
    }

    // A winning trade while half-open clears the streak
    clock.advance(Duration::seconds(60));
    let win = healthy(1).with_last_trade_pnl(Decimal::new(40, 0));
    let decision = gate.authorize(&win, &signal(90), capital, 1, None, None).await;
    assert!(decision.approved());
    assert_eq!(decision.breaker.state, BreakerState::Closed);
    assert_eq!(decision.breaker.consecutive_losses, 0);

    let status = gate.breaker().status().await;
    assert_eq!(status.trip_count, 1);
    assert_eq!(status.state, BreakerState::Closed);
}

/// Test that concurrent callers see a single trip.
#[tokio::test]
async fn test_concurrent_checks_trip_once() {
    let clock = Arc::new(ManualClock::new(market_open()));
    let gate = Arc::new(TradeGate::with_clock(&GateConfig::default(), clock).unwrap());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.authorize(&healthy(12), &signal(90), Decimal::new(50_000, 0), 12, None, None)
                    .await
            })
        })
        .collect();

    let mut tripped = 0;
    for handle in handles {
        let decision = handle.await.unwrap();
        assert!(!decision.approved());
        if decision.breaker.rule.is_some() {
            tripped += 1;
        }
    }

    assert_eq!(tripped, 1);
    assert_eq!(gate.breaker().trip_history(100).await.len(), 1);
    assert!(gate.breaker().is_open());
}

/// Test the daily loss gate across a UTC day boundary.
#[tokio::test]
async fn test_daily_loss_resets_next_day() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 23, 0, 0).unwrap(),
    ));
    let gate = TradeGate::with_clock(&GateConfig::default(), clock.clone()).unwrap();

    let first = gate
        .authorize(&healthy(0), &signal(90), Decimal::new(10_000, 0), 0, None, None)
        .await;
    assert!(first.approved());

    clock.advance(Duration::minutes(30));
    let down = gate
        .authorize(&healthy(0), &signal(90), Decimal::new(9_700, 0), 0, None, None)
        .await;
    assert!(!down.approved());
    assert_eq!(down.risk_level(), RiskLevel::Critical);

    clock.advance(Duration::minutes(31));
    let next_day = gate
        .authorize(&healthy(0), &signal(90), Decimal::new(9_700, 0), 0, None, None)
        .await;
    assert!(next_day.approved());
    assert_eq!(
        gate.opening().daily_loss_snapshot().await.starting_capital,
        Decimal::new(9_700, 0)
    );
}

/// Test retrying a flaky exchange call with policy settings from config.
#[tokio::test]
async fn test_recovery_with_configured_policy() {
    let mut config = GateConfig::default();
    config.retry.max_attempts = 3;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter = false;
    let policy = RetryPolicy::try_from(&config.retry).unwrap();

    let reconnects = Arc::new(AtomicU32::new(0));
    let mut manager = RecoveryManager::<ExternalFailure>::new();
    {
        let reconnects = reconnects.clone();
        manager.register_recovery(FailureKind::Network, move |_, _| {
            reconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    manager.register_fallback_recovery(|_, _| Err(anyhow::anyhow!("no handler")));

    let calls = AtomicU32::new(0);
    let balance = manager
        .execute_with_recovery(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Err(ExternalFailure::new(FailureKind::Network, "exchange", "reset")),
                    1 => Err(ExternalFailure::new(FailureKind::RateLimited, "exchange", "429")),
                    _ => Ok(Decimal::new(50_000, 0)),
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(balance, Decimal::new(50_000, 0));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(reconnects.load(Ordering::SeqCst), 1);
}

/// Test that gate decisions serialize with stable field names.
#[tokio::test]
async fn test_decision_serialization() {
    let gate = TradeGate::with_clock(&GateConfig::default(), Arc::new(ManualClock::new(market_open()))).unwrap();
    let decision = gate
        .authorize(&healthy(1), &signal(60), Decimal::new(50_000, 0), 1, Some("BEARISH"), Some("RANGING"))
        .await;

    let json = serde_json::to_value(&decision).unwrap();
    assert_eq!(json["breaker"]["state"], "closed");
    assert_eq!(json["breaker"]["evaluation"]["approved"], true);
    assert_eq!(json["opening"]["approved"], false);
    assert_eq!(json["opening"]["risk_level"], "MEDIUM");
    assert_eq!(json["opening"]["checks"]["daily_loss"], true);
}
