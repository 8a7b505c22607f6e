//! Market data types and source plumbing for the recap pipeline.
//!
//! Everything a source returns, API table or scraped page, is first flattened
//! into a [`FieldRow`] (target field → raw text) and then turned into a typed
//! [`MarketRecord`] by one builder, so the rest of the pipeline never knows
//! which tier served the data.

pub mod catalog;
pub mod eastmoney;
pub mod page;
pub mod provider;
pub mod resolver;
pub mod tushare;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub use catalog::{
    Acceptance, ApiDescriptor, ApiSource, CellPart, ColumnMap, Enrichment, ExtractionDescriptor,
    SourceCatalog, SourcePlan, INSTITUTIONAL_SEAT,
};
pub use eastmoney::{EastmoneyClient, EastmoneyKlineFetcher};
pub use page::HtmlPageProvider;
pub use provider::{
    ApiTable, KlineHistoryFetcher, MarketApiClient, PageCell, PageContentProvider, PageRecord,
    ProviderError, RowSelector,
};
pub use resolver::{ResolutionOutcome, ResolverConfig, SourceResolver, SourceTier};
pub use tushare::TushareClient;

// ============================================================================
// Tracked Indices
// ============================================================================

/// The three indices the recap always reports, as (Tushare code, display name).
pub const TRACKED_INDICES: [(&str, &str); 3] = [
    ("000001.SH", "上证指数"),
    ("399001.SZ", "深证成指"),
    ("399006.SZ", "创业板指"),
];

/// Display name of a tracked index code.
pub fn index_name(code: &str) -> Option<&'static str> {
    TRACKED_INDICES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

// ============================================================================
// Exchange Mapping
// ============================================================================

/// Listing exchange of a security code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Exchange {
    /// Resolve the exchange of a bare ("600519") or suffixed ("600519.SH") code.
    ///
    /// An explicit suffix wins. Bare codes starting with 6, 5 or 9 are
    /// Shanghai listings (A shares, funds, B shares); everything else is
    /// treated as Shenzhen.
    pub fn of(code: &str) -> Option<Self> {
        let (digits, suffix) = split_code(code);
        match suffix.map(|s| s.to_ascii_uppercase()).as_deref() {
            Some("SH") => return Some(Self::Shanghai),
            Some("SZ") => return Some(Self::Shenzhen),
            Some("BJ") => return Some(Self::Beijing),
            Some(_) => return None,
            None => {}
        }

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match digits.as_bytes()[0] {
            b'6' | b'5' | b'9' => Some(Self::Shanghai),
            _ => Some(Self::Shenzhen),
        }
    }

    /// Eastmoney market id used in `secid` ("1" Shanghai, "0" otherwise).
    pub fn eastmoney_market(self) -> &'static str {
        match self {
            Self::Shanghai => "1",
            Self::Shenzhen | Self::Beijing => "0",
        }
    }

    /// Sina quote prefix.
    pub fn sina_prefix(self) -> &'static str {
        match self {
            Self::Shanghai => "sh",
            Self::Shenzhen => "sz",
            Self::Beijing => "bj",
        }
    }
}

/// Split "600519.SH" into ("600519", Some("SH")).
pub fn split_code(code: &str) -> (&str, Option<&str>) {
    let code = code.trim();
    match code.split_once('.') {
        Some((digits, suffix)) => (digits, Some(suffix)),
        None => (code, None),
    }
}

// ============================================================================
// Data Needs
// ============================================================================

/// The kinds of data a recap run asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeedKind {
    Indices,
    LargeTradeLedger,
    SectorList,
    SectorLeaders,
}

impl NeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indices => "indices",
            Self::LargeTradeLedger => "large_trade_ledger",
            Self::SectorList => "sector_list",
            Self::SectorLeaders => "sector_leaders",
        }
    }
}

impl fmt::Display for NeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sector whose leaders are requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorRef {
    pub code: String,
    pub name: String,
}

/// One request for data, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNeed {
    pub kind: NeedKind,
    /// Trading day the data should describe
    pub trade_date: NaiveDate,
    /// Set only for `SectorLeaders`
    pub sector: Option<SectorRef>,
}

impl DataNeed {
    pub fn new(kind: NeedKind, trade_date: NaiveDate) -> Self {
        Self {
            kind,
            trade_date,
            sector: None,
        }
    }

    pub fn sector_leaders(
        trade_date: NaiveDate,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: NeedKind::SectorLeaders,
            trade_date,
            sector: Some(SectorRef {
                code: code.into(),
                name: name.into(),
            }),
        }
    }
}

impl fmt::Display for DataNeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sector {
            Some(sector) => write!(f, "{}({} {})", self.kind, sector.code, sector.name),
            None => write!(f, "{}", self.kind),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Closing level of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub name: String,
    pub last: Option<f64>,
    pub prev_close: Option<f64>,
}

impl IndexRecord {
    /// Percentage change against the previous close, when both sides are known.
    pub fn change_pct(&self) -> Option<f64> {
        match (self.last, self.prev_close) {
            (Some(last), Some(prev)) if prev != 0.0 => Some((last - prev) / prev * 100.0),
            _ => None,
        }
    }
}

/// One row of the large-trade (龙虎榜) ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub date: String,
    pub code: String,
    pub name: String,
    pub reason: String,
    pub close: Option<f64>,
    pub pct_change: Option<f64>,
    pub turnover_amount: Option<f64>,
    pub net_buy_amount: Option<f64>,
    pub institutional_net_buy: Option<f64>,
}

/// A concept sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRecord {
    pub name: String,
    pub code: String,
    pub pct_change: Option<f64>,
}

/// A leading stock within a sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderRecord {
    pub name: String,
    pub code: String,
    pub price: Option<f64>,
    pub pct_change: Option<f64>,
}

/// A normalized record, independent of the source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketRecord {
    Index(IndexRecord),
    Ledger(LedgerRecord),
    Sector(SectorRecord),
    Leader(LeaderRecord),
}

/// A source row that cannot become a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Malformed record: missing field `{0}`")]
    MissingField(&'static str),
}

/// Raw text values of one source row, keyed by target field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRow(HashMap<String, String>);

impl FieldRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: &str, value: &str) -> Self {
        self.insert(field, value);
        self
    }

    /// Trimmed, non-empty text of a field.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.text(field).and_then(parse_decimal)
    }

    fn require(&self, field: &'static str) -> Result<String, RecordError> {
        self.text(field)
            .map(str::to_string)
            .ok_or(RecordError::MissingField(field))
    }
}

impl MarketRecord {
    /// Build a typed record for `kind` from a flattened source row.
    pub fn from_row(kind: NeedKind, row: &FieldRow) -> Result<Self, RecordError> {
        match kind {
            NeedKind::Indices => {
                let name = row
                    .text("name")
                    .map(str::to_string)
                    .or_else(|| row.text("code").and_then(index_name).map(str::to_string))
                    .ok_or(RecordError::MissingField("name"))?;
                Ok(Self::Index(IndexRecord {
                    name,
                    last: row.number("last"),
                    prev_close: row.number("prev_close"),
                }))
            }
            NeedKind::LargeTradeLedger => Ok(Self::Ledger(LedgerRecord {
                date: row.text("date").map(normalize_date).unwrap_or_default(),
                code: row.require("code")?,
                name: row.require("name")?,
                reason: row.text("reason").unwrap_or_default().to_string(),
                close: row.number("close"),
                pct_change: row.number("pct_change"),
                turnover_amount: row.number("turnover"),
                net_buy_amount: row.number("net_buy"),
                institutional_net_buy: row.number("inst_net_buy"),
            })),
            NeedKind::SectorList => Ok(Self::Sector(SectorRecord {
                name: row.require("name")?,
                code: row.require("code")?,
                pct_change: row.number("pct_change"),
            })),
            NeedKind::SectorLeaders => Ok(Self::Leader(LeaderRecord {
                name: row.require("name")?,
                code: row.require("code")?,
                price: row.number("price"),
                pct_change: row.number("pct_change"),
            })),
        }
    }

    pub fn as_index(&self) -> Option<&IndexRecord> {
        match self {
            Self::Index(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_ledger(&self) -> Option<&LedgerRecord> {
        match self {
            Self::Ledger(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_sector(&self) -> Option<&SectorRecord> {
        match self {
            Self::Sector(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_leader(&self) -> Option<&LeaderRecord> {
        match self {
            Self::Leader(r) => Some(r),
            _ => None,
        }
    }
}

/// "20240105" → "2024-01-05"; anything else is kept as-is.
fn normalize_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Parse a locale-formatted number.
///
/// Strips thousands separators, a trailing `%`, and scales `万`/`亿`
/// suffixes. Placeholders such as `-` or `--` and anything unparsable give
/// `None`, never zero.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let mut text = cleaned.as_str();
    if let Some(rest) = text.strip_suffix('%') {
        text = rest;
    }

    let mut scale = 1.0;
    if let Some(rest) = text.strip_suffix('亿') {
        text = rest;
        scale = 1e8;
    } else if let Some(rest) = text.strip_suffix('万') {
        text = rest;
        scale = 1e4;
    }

    if text.is_empty() || text.chars().all(|c| c == '-') {
        return None;
    }

    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * scale)
}

// ============================================================================
// Candles
// ============================================================================

/// One daily candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub amount: f64,
    pub pct_change: f64,
}

impl Candle {
    /// A candle where only the close matters (open/high/low equal close).
    pub fn flat(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            close,
            high: close,
            low: close,
            volume: 0.0,
            amount: 0.0,
            pct_change: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_locale_formats() {
        assert_eq!(parse_decimal("3,123.45"), Some(3123.45));
        assert_eq!(parse_decimal("-1.25%"), Some(-1.25));
        assert_eq!(parse_decimal("+2.10%"), Some(2.10));
        assert_eq!(parse_decimal("1.5亿"), Some(1.5e8));
        assert_eq!(parse_decimal("2,300万"), Some(2.3e7));
        assert_eq!(parse_decimal(" 42 "), Some(42.0));
    }

    #[test]
    fn test_parse_decimal_placeholders_are_absent() {
        assert_eq!(parse_decimal("-"), None);
        assert_eq!(parse_decimal("--"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("停牌"), None);
        assert_eq!(parse_decimal("%"), None);
    }

    #[test]
    fn test_exchange_routing() {
        assert_eq!(Exchange::of("600519"), Some(Exchange::Shanghai));
        assert_eq!(Exchange::of("510300"), Some(Exchange::Shanghai));
        assert_eq!(Exchange::of("000001"), Some(Exchange::Shenzhen));
        assert_eq!(Exchange::of("300750"), Some(Exchange::Shenzhen));
        assert_eq!(Exchange::of("000001.SH"), Some(Exchange::Shanghai));
        assert_eq!(Exchange::of("430047.bj"), Some(Exchange::Beijing));
        assert_eq!(Exchange::of("ABC"), None);
        assert_eq!(Exchange::of("600519.HK"), None);
    }

    #[test]
    fn test_index_record_from_code_only() {
        let row = FieldRow::new()
            .with("code", "399006.SZ")
            .with("last", "2,012.30")
            .with("prev_close", "");
        let record = MarketRecord::from_row(NeedKind::Indices, &row).unwrap();
        let index = record.as_index().unwrap();
        assert_eq!(index.name, "创业板指");
        assert_eq!(index.last, Some(2012.30));
        assert_eq!(index.prev_close, None);
        assert_eq!(index.change_pct(), None);
    }

    #[test]
    fn test_missing_identity_is_malformed() {
        let row = FieldRow::new().with("name", "白酒").with("pct_change", "1.2");
        assert_eq!(
            MarketRecord::from_row(NeedKind::SectorList, &row),
            Err(RecordError::MissingField("code"))
        );
    }

    #[test]
    fn test_ledger_record_normalizes_date() {
        let row = FieldRow::new()
            .with("date", "20240105")
            .with("code", "600519.SH")
            .with("name", "贵州茅台")
            .with("net_buy", "-");
        let record = MarketRecord::from_row(NeedKind::LargeTradeLedger, &row).unwrap();
        let ledger = record.as_ledger().unwrap();
        assert_eq!(ledger.date, "2024-01-05");
        assert_eq!(ledger.net_buy_amount, None);
        assert_eq!(ledger.reason, "");
    }

    #[test]
    fn test_change_pct() {
        let index = IndexRecord {
            name: "上证指数".into(),
            last: Some(3030.0),
            prev_close: Some(3000.0),
        };
        let pct = index.change_pct().unwrap();
        assert!((pct - 1.0).abs() < 1e-9);
    }
}
