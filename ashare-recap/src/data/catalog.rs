//! Declarative source descriptors per data need.
//!
//! Each need has one primary API call and one fallback page extraction. Both
//! describe how their raw columns map onto record fields, so source changes
//! are edits here rather than in the resolver.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::provider::{ApiTable, PageRecord, RowSelector};
use super::{DataNeed, FieldRow, NeedKind, TRACKED_INDICES};

/// Structured API behind a primary source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiSource {
    Tushare,
    Eastmoney,
}

impl ApiSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tushare => "tushare",
            Self::Eastmoney => "eastmoney",
        }
    }
}

/// A primary API call.
#[derive(Debug, Clone)]
pub struct ApiDescriptor {
    pub source: ApiSource,
    pub endpoint: String,
    pub params: HashMap<String, String>,
    /// (API column, record field)
    pub columns: Vec<(String, &'static str)>,
}

impl ApiDescriptor {
    fn new(source: ApiSource, endpoint: &str) -> Self {
        Self {
            source,
            endpoint: endpoint.to_string(),
            params: HashMap::new(),
            columns: Vec::new(),
        }
    }

    fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Map columns and request exactly those columns from the API.
    fn columns(mut self, columns: &[(&str, &'static str)]) -> Self {
        self.columns = columns
            .iter()
            .map(|(src, dst)| (src.to_string(), *dst))
            .collect();
        let fields = columns.iter().map(|(src, _)| *src).collect::<Vec<_>>().join(",");
        self.params.insert("fields".to_string(), fields);
        self
    }

    /// Flatten an API table into field rows. Columns the API did not return
    /// are simply absent from the row.
    pub fn rows(&self, table: &ApiTable) -> Vec<FieldRow> {
        let positions: Vec<(Option<usize>, &'static str)> = self
            .columns
            .iter()
            .map(|(src, dst)| (table.column(src), *dst))
            .collect();

        (0..table.items.len())
            .map(|r| {
                let mut row = FieldRow::new();
                for (pos, dst) in &positions {
                    if let Some(c) = pos {
                        row.insert(*dst, table.cell_text(r, *c));
                    }
                }
                row
            })
            .collect()
    }
}

/// A second call on the same API whose values are summed per key and merged
/// into the primary rows, e.g. institutional seats from `top_inst` onto the
/// `top_list` ledger.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub call: ApiDescriptor,
    /// Record field both tables are joined on
    pub key: &'static str,
    /// Only rows whose field equals this value are counted
    pub filter: Option<(&'static str, &'static str)>,
    /// Record field receiving the per-key sum
    pub field: &'static str,
}

impl Enrichment {
    /// Sum `field` per key over the accepted enrichment rows and write the
    /// total into every primary row with that key. Rows without a match are
    /// left untouched.
    pub fn merge(&self, rows: &mut [FieldRow], table: &ApiTable) {
        let mut totals: HashMap<String, f64> = HashMap::new();
        for row in self.call.rows(table) {
            if let Some((field, value)) = self.filter {
                if row.text(field) != Some(value) {
                    continue;
                }
            }
            if let (Some(key), Some(amount)) = (row.text(self.key), row.number(self.field)) {
                *totals.entry(key.to_string()).or_insert(0.0) += amount;
            }
        }

        for row in rows.iter_mut() {
            let total = row.text(self.key).and_then(|key| totals.get(key)).copied();
            if let Some(total) = total {
                row.insert(self.field, total.to_string());
            }
        }
    }
}

/// Which part of a page cell feeds a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPart {
    Text,
    /// Security or board code taken from the cell's link target
    LinkCode,
}

/// One page column mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub index: usize,
    pub field: &'static str,
    pub part: CellPart,
}

impl ColumnMap {
    pub const fn text(index: usize, field: &'static str) -> Self {
        Self {
            index,
            field,
            part: CellPart::Text,
        }
    }

    pub const fn link_code(index: usize, field: &'static str) -> Self {
        Self {
            index,
            field,
            part: CellPart::LinkCode,
        }
    }
}

/// A fallback page extraction.
#[derive(Debug, Clone)]
pub struct ExtractionDescriptor {
    pub url: String,
    pub selector: RowSelector,
    pub columns: Vec<ColumnMap>,
}

impl ExtractionDescriptor {
    /// Flatten page records into field rows.
    pub fn rows(&self, records: &[PageRecord]) -> Vec<FieldRow> {
        records
            .iter()
            .map(|record| {
                let mut row = FieldRow::new();
                for col in &self.columns {
                    let Some(cell) = record.cell(col.index) else {
                        continue;
                    };
                    let value = match col.part {
                        CellPart::Text => Some(cell.text.clone()),
                        CellPart::LinkCode => cell.href.as_deref().and_then(code_from_href),
                    };
                    if let Some(value) = value {
                        row.insert(col.field, value);
                    }
                }
                row
            })
            .collect()
    }
}

/// Pull a code out of a quote link.
///
/// "//quote.eastmoney.com/bk/90.BK0815.html" → "BK0815",
/// "//quote.eastmoney.com/sh600519.html" → "600519"
pub fn code_from_href(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next()?;
    let file = path.trim_end_matches('/').rsplit('/').next()?;
    let file = file
        .strip_suffix(".html")
        .or_else(|| file.strip_suffix(".shtml"))
        .unwrap_or(file);
    let stem = file.rsplit('.').next()?;

    let has_market_prefix = stem
        .get(..2)
        .map_or(false, |p| ["sh", "sz", "bj"].iter().any(|m| p.eq_ignore_ascii_case(m)))
        && stem.len() > 2
        && stem[2..].chars().all(|c| c.is_ascii_digit());
    let code = if has_market_prefix { &stem[2..] } else { stem };

    (!code.is_empty()).then(|| code.to_string())
}

/// Seat name the exchanges publish for institutional accounts.
pub const INSTITUTIONAL_SEAT: &str = "机构专用";

/// Which records a need keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    All,
    /// Only the tracked indices, first occurrence of each
    TrackedIndices,
    /// First N in source order
    FirstN(usize),
}

/// Everything the resolver needs to serve one need.
#[derive(Debug, Clone)]
pub struct SourcePlan {
    pub primary: ApiDescriptor,
    pub fallback: ExtractionDescriptor,
    /// Optional extra primary call merged into the primary rows
    pub enrichment: Option<Enrichment>,
    pub acceptance: Acceptance,
    /// Exact record count for a non-degraded primary result
    pub expected: Option<usize>,
}

// ============================================================================
// Catalog
// ============================================================================

/// Builds source plans for every need kind.
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    leader_cap: usize,
    sector_page_size: usize,
}

impl Default for SourceCatalog {
    fn default() -> Self {
        Self {
            leader_cap: 3,
            sector_page_size: 50,
        }
    }
}

impl SourceCatalog {
    pub fn new(leader_cap: usize, sector_page_size: usize) -> Self {
        Self {
            leader_cap,
            sector_page_size,
        }
    }

    pub fn plan(&self, need: &DataNeed) -> SourcePlan {
        match need.kind {
            NeedKind::Indices => self.indices_plan(need.trade_date),
            NeedKind::LargeTradeLedger => self.ledger_plan(need.trade_date),
            NeedKind::SectorList => self.sector_list_plan(),
            NeedKind::SectorLeaders => {
                let code = need.sector.as_ref().map(|s| s.code.as_str()).unwrap_or_default();
                self.leaders_plan(code)
            }
        }
    }

    fn indices_plan(&self, trade_date: NaiveDate) -> SourcePlan {
        let codes = TRACKED_INDICES
            .iter()
            .map(|(code, _)| *code)
            .collect::<Vec<_>>()
            .join(",");

        SourcePlan {
            primary: ApiDescriptor::new(ApiSource::Tushare, "index_daily")
                .param("ts_code", codes)
                .param("trade_date", trade_date.format("%Y%m%d").to_string())
                .columns(&[
                    ("ts_code", "code"),
                    ("close", "last"),
                    ("pre_close", "prev_close"),
                ]),
            fallback: ExtractionDescriptor {
                url: "https://quote.eastmoney.com/center".to_string(),
                selector: RowSelector::table_rows(".table-wrap .tbody .tr"),
                columns: vec![
                    ColumnMap::text(1, "name"),
                    ColumnMap::text(2, "last"),
                    ColumnMap::text(5, "prev_close"),
                ],
            },
            enrichment: None,
            acceptance: Acceptance::TrackedIndices,
            expected: Some(TRACKED_INDICES.len()),
        }
    }

    fn ledger_plan(&self, trade_date: NaiveDate) -> SourcePlan {
        SourcePlan {
            primary: ApiDescriptor::new(ApiSource::Tushare, "top_list")
                .param("trade_date", trade_date.format("%Y%m%d").to_string())
                .columns(&[
                    ("trade_date", "date"),
                    ("ts_code", "code"),
                    ("name", "name"),
                    ("close", "close"),
                    ("pct_change", "pct_change"),
                    ("amount", "turnover"),
                    ("net_amount", "net_buy"),
                    ("reason", "reason"),
                ]),
            fallback: ExtractionDescriptor {
                url: "https://data.eastmoney.com/stock/tradedetail.html".to_string(),
                selector: RowSelector::table_rows("#dataview table tbody tr"),
                columns: vec![
                    ColumnMap::text(1, "code"),
                    ColumnMap::text(2, "name"),
                    ColumnMap::text(5, "close"),
                    ColumnMap::text(6, "pct_change"),
                    ColumnMap::text(7, "net_buy"),
                    ColumnMap::text(11, "turnover"),
                    ColumnMap::text(16, "reason"),
                ],
            },
            enrichment: Some(Enrichment {
                call: ApiDescriptor::new(ApiSource::Tushare, "top_inst")
                    .param("trade_date", trade_date.format("%Y%m%d").to_string())
                    .columns(&[
                        ("ts_code", "code"),
                        ("exalter", "seat"),
                        ("net_buy", "inst_net_buy"),
                    ]),
                key: "code",
                filter: Some(("seat", INSTITUTIONAL_SEAT)),
                field: "inst_net_buy",
            }),
            acceptance: Acceptance::All,
            expected: None,
        }
    }

    fn sector_list_plan(&self) -> SourcePlan {
        SourcePlan {
            primary: ApiDescriptor::new(ApiSource::Eastmoney, "clist")
                .param("pn", "1")
                .param("pz", self.sector_page_size.to_string())
                .param("po", "1")
                .param("np", "1")
                .param("fltt", "2")
                .param("invt", "2")
                .param("fid", "f3")
                .param("fs", "m:90+t:3")
                .columns(&[("f12", "code"), ("f14", "name"), ("f3", "pct_change")]),
            fallback: ExtractionDescriptor {
                url: "https://quote.eastmoney.com/center/boardlist.html#concept_board".to_string(),
                selector: RowSelector::table_rows("table tbody tr"),
                columns: vec![
                    ColumnMap::text(1, "name"),
                    ColumnMap::link_code(1, "code"),
                    ColumnMap::text(5, "pct_change"),
                ],
            },
            enrichment: None,
            acceptance: Acceptance::All,
            expected: None,
        }
    }

    fn leaders_plan(&self, sector_code: &str) -> SourcePlan {
        SourcePlan {
            primary: ApiDescriptor::new(ApiSource::Eastmoney, "clist")
                .param("pn", "1")
                .param("pz", self.leader_cap.to_string())
                .param("po", "1")
                .param("np", "1")
                .param("fltt", "2")
                .param("invt", "2")
                .param("fid", "f3")
                .param("fs", format!("b:{}", sector_code))
                .columns(&[
                    ("f12", "code"),
                    ("f14", "name"),
                    ("f2", "price"),
                    ("f3", "pct_change"),
                ]),
            fallback: ExtractionDescriptor {
                url: format!(
                    "https://quote.eastmoney.com/center/boardlist.html#boards2-90.{}",
                    sector_code
                ),
                selector: RowSelector::table_rows("table tbody tr"),
                columns: vec![
                    ColumnMap::text(1, "code"),
                    ColumnMap::text(2, "name"),
                    ColumnMap::text(4, "price"),
                    ColumnMap::text(5, "pct_change"),
                ],
            },
            enrichment: None,
            acceptance: Acceptance::FirstN(self.leader_cap),
            expected: Some(self.leader_cap),
        }
    }
}
