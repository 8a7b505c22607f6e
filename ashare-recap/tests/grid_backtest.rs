//! Grid recommendation and backtest behaviour on synthetic candle series.

use chrono::{Duration, NaiveDate};

use ashare_common::GridConfig;
use ashare_recap::data::Candle;
use ashare_recap::grid::{
    GridAdvisor, GridBacktestSimulator, GridError, GridRecommender, INSUFFICIENT_DATA,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
}

fn from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Candle::flat(start() + Duration::days(i as i64), c))
        .collect()
}

/// Deterministic oscillating series with intraday ranges.
fn swinging(len: usize) -> Vec<Candle> {
    (0..len)
        .map(|i| {
            let close = 50.0 + if i % 4 < 2 { 0.0 } else { -2.5 };
            Candle {
                date: start() + Duration::days(i as i64),
                open: close,
                close,
                high: close * 1.02,
                low: close * 0.98,
                volume: 10_000.0,
                amount: close * 10_000.0,
                pct_change: 0.0,
            }
        })
        .collect()
}

#[test]
fn test_scenario_dip_then_recovery() {
    let candles = from_closes(&[100.0, 100.0, 100.0, 96.0, 96.0, 99.0]);
    let result = GridBacktestSimulator::default().simulate(&candles);

    assert_eq!(result.action_count, 2);
    assert_eq!(format!("{:.2}", result.simulated_profit), "300.00");
}

#[test]
fn test_constant_series_recommends_zero_grid() {
    let candles = from_closes(&[42.0; 30]);
    let rec = GridRecommender::default().recommend(&candles).unwrap();
    assert_eq!(rec.suggested_grid_pct, 0.00);

    let result = GridBacktestSimulator::default().simulate(&candles);
    assert_eq!(result.action_count, 0);
    assert_eq!(result.simulated_profit, 0.0);
}

#[test]
fn test_short_history_never_recommends() {
    let candles = from_closes(&[10.0; 9]);
    assert_eq!(
        GridRecommender::default().recommend(&candles),
        Err(GridError::InsufficientHistory {
            got: 9,
            required: 10
        })
    );

    let result = GridAdvisor::default().analyze(&candles);
    assert!(!result.recommend);
    assert_eq!(result.reason.as_deref(), Some(INSUFFICIENT_DATA));
}

#[test]
fn test_simulation_is_deterministic() {
    let candles = swinging(60);
    let sim = GridBacktestSimulator::default();
    let first = sim.simulate(&candles);
    for _ in 0..5 {
        assert_eq!(sim.simulate(&candles), first);
    }
}

#[test]
fn test_single_dip_and_recovery_profit() {
    // 5% dip then a 6% recovery above entry
    let dip = 95.0;
    let recovery = 100.7;
    let candles = from_closes(&[100.0, dip, recovery]);
    let result = GridBacktestSimulator::default().simulate(&candles);

    assert_eq!(result.action_count, 2);
    assert!((result.simulated_profit - (recovery - dip) * 100.0).abs() < 1e-6);
}

#[test]
fn test_swinging_series_round_trips() {
    // drops of 5% every fourth day, recoveries of 5.26%
    let candles = swinging(40);
    let result = GridBacktestSimulator::default().simulate(&candles);
    // ten buys, the last one still open at the end
    assert_eq!(result.action_count, 19);
    assert_eq!(result.simulated_profit, 2250.0);
}

#[test]
fn test_advisor_combines_width_and_backtest() {
    let candles = swinging(40);
    let result = GridAdvisor::new(&GridConfig::default()).analyze(&candles);

    // amplitude 4% -> 2.00% grid, backtest still at the 3% threshold
    assert!(result.recommend);
    assert_eq!(result.grid_pct, Some(2.0));
    assert_eq!(result.action_count, 19);
    assert_eq!(
        result.narrative,
        "推荐用2.00%网格做T，近40日回测累计T次数19，模拟收益2250.00元"
    );
}

#[test]
fn test_threshold_is_independent_of_recommendation() {
    let candles = swinging(40);
    let config = GridConfig {
        threshold_pct: 6.0,
        ..GridConfig::default()
    };
    let result = GridAdvisor::new(&config).analyze(&candles);

    assert_eq!(result.grid_pct, Some(2.0));
    assert_eq!(result.action_count, 0);
}
