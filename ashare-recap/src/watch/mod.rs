//! Intraday price watcher.
//!
//! Polls a [`QuoteSource`] for every configured stock, feeds each quote to a
//! [`StockTracker`] and buffers every poll result, quote or error, into a
//! per-stock [`QuoteLog`].

pub mod logger;
pub mod sina;
pub mod tracker;

pub use logger::{log_file_path, LogEntry, QuoteLog};
pub use sina::SinaQuoteSource;
pub use tracker::{StockTracker, TrackerAction};

use ashare_common::{StockEntry, WatchConfig};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::data::ProviderError;

/// Live quote snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub time: String,
    pub current: f64,
    pub high: f64,
    pub low: f64,
}

/// Real-time quote lookup. `Ok(None)` means no quote is published, e.g. the
/// security is suspended.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, code: &str) -> Result<Option<Quote>, ProviderError>;
}

/// What one poll of one stock produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub code: String,
    pub quote: Option<Quote>,
    pub actions: Vec<TrackerAction>,
}

struct Watched {
    tracker: StockTracker,
    log: QuoteLog,
}

pub struct PriceWatcher {
    source: Arc<dyn QuoteSource>,
    stocks: Vec<Watched>,
    interval: Duration,
}

impl PriceWatcher {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        stocks: &[StockEntry],
        config: &WatchConfig,
        now: NaiveDateTime,
    ) -> Self {
        Self::with_log_dir(source, stocks, config, config.log_dir_path(), now)
    }

    pub fn with_log_dir(
        source: Arc<dyn QuoteSource>,
        stocks: &[StockEntry],
        config: &WatchConfig,
        log_dir: PathBuf,
        now: NaiveDateTime,
    ) -> Self {
        let stocks = stocks
            .iter()
            .map(|s| Watched {
                tracker: StockTracker::new(&s.code, s.buy_price, s.sell_price),
                log: QuoteLog::new(
                    log_dir.clone(),
                    &s.code,
                    Duration::from_secs(config.write_interval_secs),
                    Duration::from_secs(config.file_interval_secs),
                    now,
                ),
            })
            .collect();

        Self {
            source,
            stocks,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    pub fn tracker(&self, code: &str) -> Option<&StockTracker> {
        self.stocks
            .iter()
            .map(|w| &w.tracker)
            .find(|t| t.code() == code)
    }

    /// Poll every stock once. A failing stock is logged and does not stop
    /// the others.
    pub async fn poll_once(&mut self, now: NaiveDateTime) -> Vec<PollReport> {
        let time = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let mut reports = Vec::with_capacity(self.stocks.len());

        for watched in &mut self.stocks {
            let code = watched.tracker.code().to_string();
            let mut report = PollReport {
                code: code.clone(),
                quote: None,
                actions: Vec::new(),
            };

            match self.source.quote(&code).await {
                Ok(Some(quote)) => {
                    report.actions = watched.tracker.observe(&quote);
                    for action in &report.actions {
                        match action {
                            TrackerAction::Buy { price } => {
                                info!(code = %code, price = *price, "建议买入")
                            }
                            TrackerAction::Sell { price, profit } => {
                                info!(code = %code, price = *price, profit = *profit, "建议卖出")
                            }
                        }
                    }
                    watched.log.push(LogEntry::Quote(quote.clone()));
                    report.quote = Some(quote);
                }
                Ok(None) => warn!(code = %code, "No quote published"),
                Err(e) => {
                    warn!(code = %code, error = %e, "Quote fetch failed");
                    watched.log.push(LogEntry::Error {
                        time: time.clone(),
                        error: e.to_string(),
                    });
                }
            }

            if let Err(e) = watched.log.tick(now) {
                error!(code = %code, error = %e, "Failed to write quote log");
            }
            reports.push(report);
        }

        reports
    }

    /// Poll on a fixed interval until Ctrl-C, then flush what is buffered.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Poll on a fixed interval until `shutdown` completes. The shutdown
    /// future lives across polls, so a signal raised mid-poll ends the loop
    /// once that poll finishes.
    pub async fn run_until<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            stocks = self.stocks.len(),
            interval_secs = self.interval.as_secs(),
            "Price watcher started"
        );

        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once(Local::now().naive_local()).await;
                }
            }
        }

        for watched in &mut self.stocks {
            if watched.log.buffered() > 0 {
                watched.log.flush()?;
            }
        }
        Ok(())
    }
}
