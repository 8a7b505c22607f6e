//! Single-position grid backtest over daily closes.

use ashare_common::GridConfig;
use serde::Serialize;
use tracing::debug;

use super::recommender::{round2, validate_series};
use crate::data::Candle;

/// Outcome of a backtest or a full grid analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub recommend: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_pct: Option<f64>,
    pub action_count: u32,
    pub simulated_profit: f64,
    pub narrative: String,
}

impl BacktestResult {
    /// A result that carries no simulation, only the reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            recommend: false,
            narrative: reason.clone(),
            reason: Some(reason),
            grid_pct: None,
            action_count: 0,
            simulated_profit: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    Flat,
    Holding { entry: f64 },
}

#[derive(Debug, Clone)]
pub struct GridBacktestSimulator {
    threshold_pct: f64,
    unit_size: f64,
}

impl Default for GridBacktestSimulator {
    fn default() -> Self {
        Self::new(&GridConfig::default())
    }
}

impl GridBacktestSimulator {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            threshold_pct: config.threshold_pct,
            unit_size: config.unit_size,
        }
    }

    /// Backtest at the configured threshold.
    pub fn simulate(&self, candles: &[Candle]) -> BacktestResult {
        self.simulate_with(candles, self.threshold_pct)
    }

    /// Backtest at an explicit threshold, in percent.
    ///
    /// Flat buys one unit when the close drops more than `grid_pct` below the
    /// previous close. Holding sells when the close rises more than `grid_pct`
    /// above the entry. A position still open after the last candle is left
    /// unrealized.
    pub fn simulate_with(&self, candles: &[Candle], grid_pct: f64) -> BacktestResult {
        if let Err(e) = validate_series(candles) {
            return BacktestResult::rejected(e.to_string());
        }

        let t = grid_pct / 100.0;
        let mut position = Position::Flat;
        let mut action_count = 0u32;
        let mut profit = 0.0;

        for pair in candles.windows(2) {
            let (prev, cur) = (pair[0].close, pair[1].close);
            match position {
                Position::Flat if cur < prev * (1.0 - t) => {
                    debug!(date = %pair[1].date, price = cur, "Grid buy");
                    position = Position::Holding { entry: cur };
                    action_count += 1;
                }
                Position::Holding { entry } if cur > entry * (1.0 + t) => {
                    debug!(date = %pair[1].date, price = cur, entry, "Grid sell");
                    profit += (cur - entry) * self.unit_size;
                    position = Position::Flat;
                    action_count += 1;
                }
                _ => {}
            }
        }

        let simulated_profit = round2(profit);
        BacktestResult {
            recommend: true,
            reason: None,
            grid_pct: Some(grid_pct),
            action_count,
            simulated_profit,
            narrative: format!(
                "{:.2}%网格回测{}日，累计T次数{}，模拟收益{:.2}元",
                grid_pct,
                candles.len(),
                action_count,
                simulated_profit
            ),
        }
    }
}
