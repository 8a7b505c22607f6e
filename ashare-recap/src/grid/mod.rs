//! Grid trading heuristics over daily candles.
//!
//! Recommendation and backtest are separate stages: the recommender derives a
//! width from amplitude, the simulator backtests at its own threshold.

pub mod advisor;
pub mod recommender;
pub mod simulator;

pub use advisor::{GridAdvisor, GridService, INSUFFICIENT_DATA};
pub use recommender::{validate_series, GridError, GridRecommendation, GridRecommender};
pub use simulator::{BacktestResult, GridBacktestSimulator};
