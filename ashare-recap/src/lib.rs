//! A-share market recap and grid-trading advisor.
//!
//! - `data`: source plumbing. API clients, page extraction, two-tier resolution
//! - `recap`: stage orchestration and Markdown report output
//! - `grid`: amplitude-based grid recommendation and backtest
//! - `news`: front-page headline digest
//! - `watch`: intraday price watcher with buy/sell thresholds

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod error;
pub mod grid;
pub mod news;
pub mod recap;
pub mod watch;

pub use error::{RecapError, TierFailure};
