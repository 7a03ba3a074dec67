//! Latency benchmarks for the gate hot path.
//!
//! Run with: `cargo bench --bench latency`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gate_core::{Direction, GateConfig, TradingSignal};
use recovery::RetryPolicy;
use risk_manager::{CircuitBreaker, PortfolioMetrics, TradeGate};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn signal() -> TradingSignal {
    TradingSignal::new(
        "BTC-USDT",
        Direction::Long,
        Decimal::new(65_000, 0),
        Decimal::new(85, 2),
        Decimal::new(1_000, 0),
    )
}

/// Benchmark a breaker check with and without the optional rules.
fn bench_breaker_check(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("breaker_check");
    group.throughput(Throughput::Elements(1));

    let breaker = CircuitBreaker::new(GateConfig::default().circuit_breaker).unwrap();
    let base = PortfolioMetrics::new(Decimal::new(100_000, 0), Decimal::new(-100, 0), 3);
    let full = base
        .clone()
        .with_last_trade_pnl(Decimal::new(12, 0))
        .with_volatility(Decimal::new(21, 2), Decimal::new(20, 2));

    group.bench_function("core_rules", |b| {
        b.iter(|| rt.block_on(breaker.check(black_box(&base))))
    });

    group.bench_function("all_rules", |b| {
        b.iter(|| rt.block_on(breaker.check(black_box(&full))))
    });

    group.bench_function("is_open_fast_path", |b| b.iter(|| black_box(breaker.is_open())));

    group.finish();
}

/// Benchmark the full authorize path through both gates.
fn bench_authorize(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("authorize");
    group.throughput(Throughput::Elements(1));

    let gate = TradeGate::new(&GateConfig::default()).unwrap();
    let metrics = PortfolioMetrics::new(Decimal::new(100_000, 0), Decimal::ZERO, 2);
    let signal = signal();

    for positions in [0u32, 5, 9] {
        group.bench_with_input(
            BenchmarkId::new("open_positions", positions),
            &positions,
            |b, &positions| {
                b.iter(|| {
                    rt.block_on(gate.authorize(
                        black_box(&metrics),
                        black_box(&signal),
                        Decimal::new(50_000, 0),
                        positions,
                        None,
                        None,
                    ))
                })
            },
        );
    }

    group.finish();
}

/// Benchmark backoff delay computation.
fn bench_retry_delay(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_delay");
    let policy = RetryPolicy::default();

    group.bench_function("base_delay", |b| {
        b.iter(|| black_box(policy.base_delay(black_box(4))))
    });

    group.bench_function("jittered_delay", |b| {
        b.iter(|| black_box(policy.delay(black_box(4))))
    });

    group.finish();
}

/// Benchmark decision serialization (monitor output path).
fn bench_decision_serialization(c: &mut Criterion) {
    let rt = runtime();
    let gate = TradeGate::new(&GateConfig::default()).unwrap();
    let metrics = PortfolioMetrics::new(Decimal::new(100_000, 0), Decimal::ZERO, 2);
    let decision = rt.block_on(gate.authorize(
        &metrics,
        &signal(),
        Decimal::new(50_000, 0),
        2,
        None,
        None,
    ));

    let mut group = c.benchmark_group("serialization");
    group.throughput(Throughput::Elements(1));
    group.bench_function("decision_to_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&decision)).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_breaker_check,
    bench_authorize,
    bench_retry_delay,
    bench_decision_serialization,
);

criterion_main!(benches);
