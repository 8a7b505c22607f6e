//! Scrape orchestration for one recap run.
//!
//! Order is fixed: indices, ledger, sector list, then leaders for each of the
//! top sectors. Leader lookups depend on the sector list and fan out with a
//! bounded number in flight; results are put back into sector order before
//! they are returned.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::data::{DataNeed, NeedKind, ResolutionOutcome, SectorRecord, SourceResolver};
use crate::error::RecapError;

/// Orchestration tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Trading day the recap describes
    pub trade_date: NaiveDate,
    /// Sectors whose leaders are looked up
    pub top_k: usize,
    /// Maximum leader lookups in flight
    pub leader_concurrency: usize,
}

impl OrchestratorConfig {
    pub fn new(trade_date: NaiveDate) -> Self {
        Self {
            trade_date,
            top_k: 20,
            leader_concurrency: 3,
        }
    }
}

pub struct ScrapeOrchestrator {
    resolver: Arc<SourceResolver>,
    config: OrchestratorConfig,
}

impl ScrapeOrchestrator {
    pub fn new(resolver: Arc<SourceResolver>, config: OrchestratorConfig) -> Self {
        Self { resolver, config }
    }

    /// Run every stage and return outcomes in report order.
    ///
    /// Indices and the sector list are required; their failure aborts the
    /// run before any leader lookup. The ledger and individual sectors'
    /// leaders degrade to empty outcomes instead.
    pub async fn build_recap(&self) -> Result<Vec<ResolutionOutcome>, RecapError> {
        let date = self.config.trade_date;
        let mut outcomes = Vec::new();

        let indices = self
            .resolver
            .resolve(&DataNeed::new(NeedKind::Indices, date))
            .await
            .map_err(|e| RecapError::stage(NeedKind::Indices, e))?;
        outcomes.push(indices);

        let ledger_need = DataNeed::new(NeedKind::LargeTradeLedger, date);
        let ledger = match self.resolver.resolve(&ledger_need).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Ledger unavailable, continuing without it");
                ResolutionOutcome::unavailable(ledger_need)
            }
        };
        outcomes.push(ledger);

        let mut sectors = self
            .resolver
            .resolve(&DataNeed::new(NeedKind::SectorList, date))
            .await
            .map_err(|e| RecapError::stage(NeedKind::SectorList, e))?;
        sectors.records.truncate(self.config.top_k);

        let targets: Vec<SectorRecord> = sectors
            .records
            .iter()
            .filter_map(|r| r.as_sector().cloned())
            .collect();
        outcomes.push(sectors);

        outcomes.extend(self.resolve_leaders(&targets).await);

        info!(
            sections = outcomes.len(),
            degraded = outcomes.iter().filter(|o| o.degraded).count(),
            "Recap data collected"
        );
        Ok(outcomes)
    }

    /// Look up leaders for each sector, at most `leader_concurrency` at a time.
    async fn resolve_leaders(&self, sectors: &[SectorRecord]) -> Vec<ResolutionOutcome> {
        let date = self.config.trade_date;
        let limit = self.config.leader_concurrency.max(1);

        let mut results: Vec<(usize, ResolutionOutcome)> = stream::iter(sectors.iter().enumerate())
            .map(|(i, sector)| {
                let resolver = Arc::clone(&self.resolver);
                let need = DataNeed::sector_leaders(date, &sector.code, &sector.name);
                async move {
                    let outcome = match resolver.resolve(&need).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(sector = %need, error = %e, "Leader lookup failed");
                            ResolutionOutcome::unavailable(need)
                        }
                    };
                    (i, outcome)
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
