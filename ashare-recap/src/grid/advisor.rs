//! Grid advice: recommendation plus backtest in one result.

use ashare_common::GridConfig;
use std::sync::Arc;
use tracing::info;

use super::recommender::{GridError, GridRecommender};
use super::simulator::{BacktestResult, GridBacktestSimulator};
use crate::data::{Candle, KlineHistoryFetcher, ProviderError};

pub const INSUFFICIENT_DATA: &str = "数据不足";

#[derive(Debug, Clone, Default)]
pub struct GridAdvisor {
    recommender: GridRecommender,
    simulator: GridBacktestSimulator,
}

impl GridAdvisor {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            recommender: GridRecommender::new(config),
            simulator: GridBacktestSimulator::new(config),
        }
    }

    /// Recommend a grid width and backtest at the configured threshold.
    ///
    /// The threshold and the recommended width are independent; `grid_pct`
    /// in the result is the recommended width.
    pub fn analyze(&self, candles: &[Candle]) -> BacktestResult {
        let recommendation = match self.recommender.recommend(candles) {
            Ok(rec) => rec,
            Err(GridError::InsufficientHistory { .. }) => {
                return BacktestResult::rejected(INSUFFICIENT_DATA)
            }
            Err(e) => return BacktestResult::rejected(e.to_string()),
        };

        let backtest = self.simulator.simulate(candles);
        if !backtest.recommend {
            return backtest;
        }

        let grid = recommendation.suggested_grid_pct;
        BacktestResult {
            recommend: true,
            reason: None,
            grid_pct: Some(grid),
            action_count: backtest.action_count,
            simulated_profit: backtest.simulated_profit,
            narrative: format!(
                "推荐用{:.2}%网格做T，近{}日回测累计T次数{}，模拟收益{:.2}元",
                grid,
                candles.len(),
                backtest.action_count,
                backtest.simulated_profit
            ),
        }
    }
}

/// Fetches history for a code and analyzes it.
pub struct GridService {
    fetcher: Arc<dyn KlineHistoryFetcher>,
    advisor: GridAdvisor,
    lookback_days: u32,
}

impl GridService {
    pub fn new(fetcher: Arc<dyn KlineHistoryFetcher>, config: &GridConfig) -> Self {
        Self {
            fetcher,
            advisor: GridAdvisor::new(config),
            lookback_days: config.lookback_days,
        }
    }

    pub fn with_lookback(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub async fn advise(&self, code: &str) -> Result<BacktestResult, ProviderError> {
        let candles = self.fetcher.fetch(code, self.lookback_days).await?;
        let result = self.advisor.analyze(&candles);
        info!(
            code,
            candles = candles.len(),
            recommend = result.recommend,
            actions = result.action_count,
            "Grid analysis complete"
        );
        Ok(result)
    }
}
