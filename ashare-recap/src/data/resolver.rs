//! Two-tier source resolution.
//!
//! For every need: call the primary API, and if it fails or yields nothing
//! usable, run the fallback page extraction. Both tiers feed the same record
//! builder, so callers get one shape back regardless of which tier served it.
//! There are no internal retries and no memory of earlier runs; the primary
//! is always tried first.

use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::catalog::{Acceptance, ApiSource, Enrichment, SourceCatalog, SourcePlan};
use super::provider::{MarketApiClient, PageContentProvider, ProviderError};
use super::{DataNeed, FieldRow, MarketRecord, NeedKind, TRACKED_INDICES};
use crate::error::{RecapError, TierFailure};

/// Which tier served an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceTier {
    Primary,
    Fallback,
}

/// The result of resolving one need.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub need: DataNeed,
    pub source_used: SourceTier,
    pub records: Vec<MarketRecord>,
    /// Fallback was used, or the record count differs from what the need expects
    pub degraded: bool,
}

impl ResolutionOutcome {
    /// Placeholder for a non-fatal stage that produced nothing.
    pub fn unavailable(need: DataNeed) -> Self {
        Self {
            need,
            source_used: SourceTier::Fallback,
            records: Vec::new(),
            degraded: true,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.records.is_empty()
    }
}

/// Resolver tunables.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Bound on each individual API or page call
    pub call_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
        }
    }
}

/// Resolves data needs against primary APIs with page fallback.
pub struct SourceResolver {
    catalog: SourceCatalog,
    clients: HashMap<ApiSource, Arc<dyn MarketApiClient>>,
    pages: Arc<dyn PageContentProvider>,
    config: ResolverConfig,
}

impl SourceResolver {
    pub fn new(
        catalog: SourceCatalog,
        pages: Arc<dyn PageContentProvider>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            catalog,
            clients: HashMap::new(),
            pages,
            config,
        }
    }

    /// Register the client serving a primary API.
    pub fn with_client(mut self, source: ApiSource, client: Arc<dyn MarketApiClient>) -> Self {
        self.clients.insert(source, client);
        self
    }

    /// Resolve one need. Never returns an empty success.
    pub async fn resolve(&self, need: &DataNeed) -> Result<ResolutionOutcome, RecapError> {
        let plan = self.catalog.plan(need);

        let primary_failure = match self.try_primary(need, &plan).await {
            Ok(records) => {
                let degraded = plan.expected.map_or(false, |n| records.len() != n);
                if degraded {
                    warn!(
                        need = %need,
                        expected = ?plan.expected,
                        got = records.len(),
                        "Primary source returned an unexpected record count"
                    );
                }
                info!(need = %need, records = records.len(), degraded, "Resolved from primary");
                return Ok(ResolutionOutcome {
                    need: need.clone(),
                    source_used: SourceTier::Primary,
                    records,
                    degraded,
                });
            }
            Err(failure) => failure,
        };

        warn!(
            need = %need,
            error = %primary_failure,
            "Primary source failed, falling back to page extraction"
        );

        match self.try_fallback(need, &plan).await {
            Ok(records) => {
                info!(need = %need, records = records.len(), "Resolved from fallback");
                Ok(ResolutionOutcome {
                    need: need.clone(),
                    source_used: SourceTier::Fallback,
                    records,
                    degraded: true,
                })
            }
            Err(fallback_failure) => {
                warn!(need = %need, error = %fallback_failure, "Fallback source failed");
                Err(RecapError::NoDataAvailable {
                    need: need.to_string(),
                    primary: primary_failure,
                    fallback: fallback_failure,
                })
            }
        }
    }

    async fn try_primary(
        &self,
        need: &DataNeed,
        plan: &SourcePlan,
    ) -> Result<Vec<MarketRecord>, TierFailure> {
        let descriptor = &plan.primary;
        let client = self
            .clients
            .get(&descriptor.source)
            .ok_or(TierFailure::NoClient(descriptor.source.as_str()))?;

        debug!(
            need = %need,
            client = client.name(),
            endpoint = %descriptor.endpoint,
            "Querying primary source"
        );

        let table = tokio::time::timeout(
            self.config.call_timeout,
            client.query(&descriptor.endpoint, &descriptor.params),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.call_timeout))??;

        let mut rows = descriptor.rows(&table);
        if let Some(enrichment) = &plan.enrichment {
            if !rows.is_empty() {
                self.enrich(need, enrichment, &mut rows).await;
            }
        }

        non_empty(build_records(need, &rows, plan.acceptance))
    }

    /// Merge an enrichment call into primary rows. A failed enrichment only
    /// leaves its field empty.
    async fn enrich(&self, need: &DataNeed, enrichment: &Enrichment, rows: &mut [FieldRow]) {
        let call = &enrichment.call;
        let Some(client) = self.clients.get(&call.source) else {
            warn!(need = %need, endpoint = %call.endpoint, "No client for enrichment call");
            return;
        };

        match tokio::time::timeout(
            self.config.call_timeout,
            client.query(&call.endpoint, &call.params),
        )
        .await
        {
            Ok(Ok(table)) => {
                debug!(need = %need, endpoint = %call.endpoint, rows = table.items.len(), "Merging enrichment");
                enrichment.merge(rows, &table);
            }
            Ok(Err(e)) => {
                warn!(need = %need, endpoint = %call.endpoint, error = %e, "Enrichment call failed")
            }
            Err(_) => warn!(
                need = %need,
                endpoint = %call.endpoint,
                timeout = ?self.config.call_timeout,
                "Enrichment call timed out"
            ),
        }
    }

    async fn try_fallback(
        &self,
        need: &DataNeed,
        plan: &SourcePlan,
    ) -> Result<Vec<MarketRecord>, TierFailure> {
        let descriptor = &plan.fallback;
        debug!(need = %need, url = %descriptor.url, "Extracting fallback page");

        let page_records = tokio::time::timeout(
            self.config.call_timeout,
            self.pages
                .extract(&descriptor.url, &descriptor.selector, self.config.call_timeout),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.call_timeout))??;

        non_empty(build_records(need, &descriptor.rows(&page_records), plan.acceptance))
    }
}

fn non_empty(records: Vec<MarketRecord>) -> Result<Vec<MarketRecord>, TierFailure> {
    if records.is_empty() {
        Err(TierFailure::Empty)
    } else {
        Ok(records)
    }
}

/// Ledger rows from sources without a date column describe the requested day.
fn with_trade_date<'a>(need: &DataNeed, row: &'a FieldRow) -> Cow<'a, FieldRow> {
    if need.kind == NeedKind::LargeTradeLedger && row.text("date").is_none() {
        let mut filled = row.clone();
        filled.insert("date", need.trade_date.format("%Y%m%d").to_string());
        Cow::Owned(filled)
    } else {
        Cow::Borrowed(row)
    }
}

/// Turn field rows into records, skipping malformed rows, then apply the
/// need's acceptance rule.
fn build_records(need: &DataNeed, rows: &[FieldRow], acceptance: Acceptance) -> Vec<MarketRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        match MarketRecord::from_row(need.kind, &with_trade_date(need, row)) {
            Ok(record) => records.push(record),
            Err(e) => warn!(need = %need, row = i, error = %e, "Skipping malformed row"),
        }
    }

    match acceptance {
        Acceptance::All => records,
        Acceptance::FirstN(n) => {
            records.truncate(n);
            records
        }
        Acceptance::TrackedIndices => {
            let mut kept: Vec<MarketRecord> = Vec::with_capacity(TRACKED_INDICES.len());
            for record in records {
                let Some(index) = record.as_index() else {
                    continue;
                };
                let tracked = TRACKED_INDICES.iter().any(|(_, name)| *name == index.name);
                let seen = kept
                    .iter()
                    .any(|r| r.as_index().map_or(false, |k| k.name == index.name));
                if tracked && !seen {
                    kept.push(record);
                }
            }
            kept
        }
    }
}
