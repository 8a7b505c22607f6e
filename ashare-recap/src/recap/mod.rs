//! Daily recap: orchestration, rendering and report output.

pub mod orchestrator;
pub mod report;

pub use orchestrator::{OrchestratorConfig, ScrapeOrchestrator};
pub use report::{save_markdown, save_report, ReportAssembler, PLACEHOLDER};

use ashare_common::Config;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::data::{
    ApiSource, EastmoneyClient, HtmlPageProvider, ResolverConfig, SourceCatalog, SourceResolver,
    TushareClient,
};

/// Wire the production resolver from configuration.
///
/// Without a Tushare token the Tushare-backed needs resolve from their
/// fallback pages.
pub fn build_resolver(config: &Config) -> SourceResolver {
    let timeout = config.sources.call_timeout();
    let catalog = SourceCatalog::new(config.recap.leader_cap, config.recap.top_k.max(50));
    let pages = Arc::new(HtmlPageProvider::from_config(config));

    let mut resolver = SourceResolver::new(catalog, pages, ResolverConfig { call_timeout: timeout })
        .with_client(ApiSource::Eastmoney, Arc::new(EastmoneyClient::new(timeout)));

    match TushareClient::from_config(config) {
        Some(client) => resolver = resolver.with_client(ApiSource::Tushare, Arc::new(client)),
        None => tracing::warn!("No Tushare token configured, indices and ledger will use page fallback"),
    }

    resolver
}

/// Orchestrator settings for a given trading day.
pub fn orchestrator_config(config: &Config, trade_date: NaiveDate) -> OrchestratorConfig {
    OrchestratorConfig {
        trade_date,
        top_k: config.recap.top_k,
        leader_concurrency: config.recap.leader_concurrency,
    }
}
