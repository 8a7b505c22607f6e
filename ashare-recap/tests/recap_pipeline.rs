//! End-to-end recap pipeline tests against scripted sources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use ashare_recap::data::{
    ApiSource, ApiTable, MarketApiClient, NeedKind, PageContentProvider, PageRecord,
    ProviderError, ResolverConfig, RowSelector, SourceCatalog, SourceResolver, SourceTier,
};
use ashare_recap::recap::{OrchestratorConfig, ReportAssembler, ScrapeOrchestrator};

// ============================================================================
// Scripted Market API
// ============================================================================

/// Serves every endpoint the recap uses; individual needs can be made to fail.
struct ScriptedMarket {
    sectors: usize,
    fail_indices: bool,
    fail_ledger: bool,
    fail_sectors: bool,
    leader_delay: Duration,
    calls: AtomicU32,
    leader_calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedMarket {
    fn new(sectors: usize) -> Self {
        Self {
            sectors,
            fail_indices: false,
            fail_ledger: false,
            fail_sectors: false,
            leader_delay: Duration::from_millis(5),
            calls: AtomicU32::new(0),
            leader_calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn indices(&self) -> Result<ApiTable, ProviderError> {
        if self.fail_indices {
            return Err(ProviderError::Network("index_daily down".into()));
        }
        Ok(ApiTable {
            fields: vec!["ts_code".into(), "close".into(), "pre_close".into()],
            items: vec![
                vec![json!("000001.SH"), json!(3050.12), json!(3040.0)],
                vec![json!("399001.SZ"), json!(9800.5), json!(null)],
                vec![json!("399006.SZ"), json!(1900.0), json!(1910.0)],
            ],
        })
    }

    fn ledger(&self) -> Result<ApiTable, ProviderError> {
        if self.fail_ledger {
            return Err(ProviderError::Auth("token expired".into()));
        }
        Ok(ApiTable {
            fields: vec![
                "trade_date".into(),
                "ts_code".into(),
                "name".into(),
                "close".into(),
                "pct_change".into(),
                "amount".into(),
                "net_amount".into(),
                "reason".into(),
            ],
            items: vec![vec![
                json!("20240105"),
                json!("600519.SH"),
                json!("贵州茅台"),
                json!(1712.3),
                json!(1.29),
                json!(250000000.0),
                json!(12000000.0),
                json!("日涨幅偏离值达7%"),
            ]],
        })
    }

    fn institutional_seats(&self) -> Result<ApiTable, ProviderError> {
        Ok(ApiTable {
            fields: vec!["ts_code".into(), "exalter".into(), "net_buy".into()],
            items: vec![
                vec![json!("600519.SH"), json!("机构专用"), json!(50000000.0)],
                vec![json!("600519.SH"), json!("机构专用"), json!(30000000.0)],
            ],
        })
    }

    fn sectors(&self) -> Result<ApiTable, ProviderError> {
        if self.fail_sectors {
            return Err(ProviderError::Malformed("unexpected payload".into()));
        }
        Ok(ApiTable {
            fields: vec!["f12".into(), "f14".into(), "f3".into()],
            items: (0..self.sectors)
                .map(|i| {
                    vec![
                        json!(format!("BK{:04}", i)),
                        json!(format!("板块{}", i)),
                        json!(10.0 - i as f64 * 0.1),
                    ]
                })
                .collect(),
        })
    }

    async fn leaders(&self, board: &str) -> Result<ApiTable, ProviderError> {
        self.leader_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // later boards answer faster so completion order differs from request order
        let index: u64 = board.trim_start_matches("BK").parse().unwrap_or(0);
        let delay = self.leader_delay * (20u32.saturating_sub(index as u32)).max(1);
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ApiTable {
            fields: vec!["f12".into(), "f14".into(), "f2".into(), "f3".into()],
            items: (0..3)
                .map(|j| {
                    vec![
                        json!(format!("{}-{}", board, j)),
                        json!(format!("{}龙头{}", board, j)),
                        json!(10.0 + j as f64),
                        json!(9.99),
                    ]
                })
                .collect(),
        })
    }
}

#[async_trait]
impl MarketApiClient for ScriptedMarket {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn query(
        &self,
        endpoint: &str,
        params: &HashMap<String, String>,
    ) -> Result<ApiTable, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match endpoint {
            "index_daily" => self.indices(),
            "top_list" => self.ledger(),
            "top_inst" => self.institutional_seats(),
            "clist" => match params.get("fs").and_then(|fs| fs.strip_prefix("b:")) {
                Some(board) => self.leaders(board).await,
                None => self.sectors(),
            },
            other => Err(ProviderError::InvalidRequest(format!("unknown endpoint {other}"))),
        }
    }
}

/// Every fallback page is broken.
struct DeadPages {
    calls: AtomicU32,
}

#[async_trait]
impl PageContentProvider for DeadPages {
    async fn extract(
        &self,
        url: &str,
        _selector: &RowSelector,
        _timeout: Duration,
    ) -> Result<Vec<PageRecord>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::SelectorNotFound(url.to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn orchestrator(
    market: Arc<ScriptedMarket>,
    pages: Arc<DeadPages>,
    top_k: usize,
    concurrency: usize,
) -> ScrapeOrchestrator {
    let resolver = SourceResolver::new(SourceCatalog::default(), pages, ResolverConfig::default())
        .with_client(ApiSource::Tushare, market.clone())
        .with_client(ApiSource::Eastmoney, market);

    ScrapeOrchestrator::new(
        Arc::new(resolver),
        OrchestratorConfig {
            trade_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            top_k,
            leader_concurrency: concurrency,
        },
    )
}

fn dead_pages() -> Arc<DeadPages> {
    Arc::new(DeadPages {
        calls: AtomicU32::new(0),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_recap_in_stage_order() {
    let market = Arc::new(ScriptedMarket::new(25));
    let outcomes = orchestrator(market.clone(), dead_pages(), 20, 3)
        .build_recap()
        .await
        .unwrap();

    // indices, ledger, sector list, then one outcome per top sector
    assert_eq!(outcomes.len(), 3 + 20);
    assert_eq!(outcomes[0].need.kind, NeedKind::Indices);
    assert_eq!(outcomes[1].need.kind, NeedKind::LargeTradeLedger);
    assert_eq!(outcomes[2].need.kind, NeedKind::SectorList);
    assert_eq!(outcomes[2].records.len(), 20);
    assert_eq!(market.leader_calls.load(Ordering::SeqCst), 20);

    let at = NaiveDate::from_ymd_opt(2024, 1, 5)
        .unwrap()
        .and_hms_opt(16, 0, 0)
        .unwrap();
    let report = ReportAssembler::default().render_at(&outcomes, at);
    let first = report.find("## 一、").unwrap();
    let second = report.find("## 二、").unwrap();
    let third = report.find("## 三、").unwrap();
    assert!(first < second && second < third);
    assert!(report.contains("贵州茅台"));
    assert!(report.contains("机构净买入8000.00万"));
    assert!(report.contains("BK0000龙头0"));
    // absent prev close renders as a placeholder
    assert!(report.contains("昨收--"));
}

#[tokio::test]
async fn test_leader_order_matches_sector_order() {
    let market = Arc::new(ScriptedMarket::new(12));
    let outcomes = orchestrator(market, dead_pages(), 12, 4)
        .build_recap()
        .await
        .unwrap();

    let boards: Vec<String> = outcomes[3..]
        .iter()
        .map(|o| o.need.sector.as_ref().unwrap().code.clone())
        .collect();
    let expected: Vec<String> = (0..12).map(|i| format!("BK{:04}", i)).collect();
    assert_eq!(boards, expected);

    for outcome in &outcomes[3..] {
        let board = &outcome.need.sector.as_ref().unwrap().code;
        let codes: Vec<&str> = outcome
            .records
            .iter()
            .map(|r| r.as_leader().unwrap().code.as_str())
            .collect();
        assert_eq!(
            codes,
            vec![
                format!("{}-0", board),
                format!("{}-1", board),
                format!("{}-2", board)
            ]
        );
        assert_eq!(outcome.source_used, SourceTier::Primary);
        assert!(!outcome.degraded);
    }
}

#[tokio::test]
async fn test_leader_concurrency_is_bounded() {
    let market = Arc::new(ScriptedMarket::new(15));
    orchestrator(market.clone(), dead_pages(), 15, 3)
        .build_recap()
        .await
        .unwrap();

    let max = market.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "max in flight was {max}");
    assert!(max >= 1);
}

#[tokio::test]
async fn test_sector_list_failure_aborts_before_leaders() {
    let mut market = ScriptedMarket::new(10);
    market.fail_sectors = true;
    let market = Arc::new(market);
    let pages = dead_pages();

    let err = orchestrator(market.clone(), pages.clone(), 20, 3)
        .build_recap()
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(NeedKind::SectorList));
    assert_eq!(market.leader_calls.load(Ordering::SeqCst), 0);
    // one fallback attempt for the sector list only
    assert_eq!(pages.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_indices_failure_aborts() {
    let mut market = ScriptedMarket::new(10);
    market.fail_indices = true;
    let market = Arc::new(market);

    let err = orchestrator(market.clone(), dead_pages(), 20, 3)
        .build_recap()
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(NeedKind::Indices));
    assert_eq!(market.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ledger_failure_is_not_fatal() {
    let mut market = ScriptedMarket::new(5);
    market.fail_ledger = true;
    let market = Arc::new(market);

    let outcomes = orchestrator(market, dead_pages(), 20, 3)
        .build_recap()
        .await
        .unwrap();

    let ledger = &outcomes[1];
    assert_eq!(ledger.need.kind, NeedKind::LargeTradeLedger);
    assert!(ledger.is_unavailable());
    assert!(ledger.degraded);
    assert_eq!(outcomes.len(), 3 + 5);
}
