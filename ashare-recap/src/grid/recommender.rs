//! Grid width recommendation from average intraday amplitude.

use ashare_common::GridConfig;
use serde::Serialize;
use thiserror::Error;

use crate::data::Candle;

/// Errors for grid analysis input.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GridError {
    #[error("Insufficient history: {got} candles, at least {required} required")]
    InsufficientHistory { got: usize, required: usize },

    #[error("Invalid candle series: {0}")]
    InvalidSeries(String),
}

/// Suggested grid width.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRecommendation {
    /// Grid width in percent, two decimals
    pub suggested_grid_pct: f64,
    pub basis: &'static str,
}

/// Candles must be strictly ascending by date with positive closes.
pub fn validate_series(candles: &[Candle]) -> Result<(), GridError> {
    for (i, candle) in candles.iter().enumerate() {
        if candle.close.is_nan() || candle.close <= 0.0 {
            return Err(GridError::InvalidSeries(format!(
                "non-positive close {} on {}",
                candle.close, candle.date
            )));
        }
        if i > 0 && candle.date <= candles[i - 1].date {
            return Err(GridError::InvalidSeries(format!(
                "dates not strictly ascending at {}",
                candle.date
            )));
        }
    }
    Ok(())
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
pub struct GridRecommender {
    min_history: usize,
    amplitude_multiplier: f64,
}

impl Default for GridRecommender {
    fn default() -> Self {
        Self::new(&GridConfig::default())
    }
}

impl GridRecommender {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            min_history: config.min_history,
            amplitude_multiplier: config.amplitude_multiplier,
        }
    }

    /// Grid width = mean(|high - low| / close) × multiplier, in percent.
    ///
    /// With the default multiplier of 50 the grid is about half the average
    /// daily swing expressed in percent.
    pub fn recommend(&self, candles: &[Candle]) -> Result<GridRecommendation, GridError> {
        if candles.len() < self.min_history {
            return Err(GridError::InsufficientHistory {
                got: candles.len(),
                required: self.min_history,
            });
        }
        validate_series(candles)?;

        let total: f64 = candles
            .iter()
            .map(|c| ((c.high - c.low) / c.close).abs())
            .sum();
        let average = total / candles.len() as f64;

        Ok(GridRecommendation {
            suggested_grid_pct: round2(average * self.amplitude_multiplier),
            basis: "average true amplitude",
        })
    }
}
