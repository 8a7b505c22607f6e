//! Collaborator traits for market data sources.
//!
//! Three seams: structured APIs ([`MarketApiClient`]), scraped pages
//! ([`PageContentProvider`]) and daily kline history
//! ([`KlineHistoryFetcher`]). The resolver and the grid advisor only talk to
//! these traits, so tests swap in mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::Candle;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors raised by a single source call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Connection failed or non-success HTTP status
    #[error("Network error: {0}")]
    Network(String),

    /// Missing or rejected credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The call exceeded its bound
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The page loaded but the row selector matched nothing
    #[error("Selector not found: {0}")]
    SelectorNotFound(String),

    /// Payload could not be decoded
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Caller passed something unusable (bad code, bad selector)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// ============================================================================
// Structured API
// ============================================================================

/// Tabular API result: column names plus positional rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiTable {
    pub fields: Vec<String>,
    #[serde(default)]
    pub items: Vec<Vec<serde_json::Value>>,
}

impl ApiTable {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Position of a column by name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    /// Text of one cell. Strings are taken as-is, numbers are printed,
    /// null and missing cells are empty.
    pub fn cell_text(&self, row: usize, column: usize) -> String {
        match self.items.get(row).and_then(|r| r.get(column)) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// A structured market data API. Credentials live inside the client.
#[async_trait]
pub trait MarketApiClient: Send + Sync {
    /// Client name for logs
    fn name(&self) -> &str;

    async fn query(
        &self,
        endpoint: &str,
        params: &HashMap<String, String>,
    ) -> Result<ApiTable, ProviderError>;
}

// ============================================================================
// Page Extraction
// ============================================================================

/// Row and cell selectors for a page table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSelector {
    /// CSS selector matching one element per record
    pub row: String,
    /// CSS selector matching cells inside a row
    pub cell: String,
}

impl RowSelector {
    pub fn new(row: impl Into<String>, cell: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            cell: cell.into(),
        }
    }

    /// Rows of a plain HTML table body.
    pub fn table_rows(row: impl Into<String>) -> Self {
        Self::new(row, "td")
    }
}

/// One extracted cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCell {
    pub text: String,
    /// Target of the cell's link, if it is or contains one
    pub href: Option<String>,
}

impl PageCell {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: None,
        }
    }

    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: Some(href.into()),
        }
    }
}

/// Cells under one matched row, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRecord {
    pub cells: Vec<PageCell>,
}

impl PageRecord {
    pub fn new(cells: Vec<PageCell>) -> Self {
        Self { cells }
    }

    /// Convenience for text-only rows.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: texts.into_iter().map(PageCell::text).collect(),
        }
    }

    pub fn cell(&self, index: usize) -> Option<&PageCell> {
        self.cells.get(index)
    }
}

/// Loads a page and extracts table-like records from it.
#[async_trait]
pub trait PageContentProvider: Send + Sync {
    async fn extract(
        &self,
        url: &str,
        selector: &RowSelector,
        timeout: Duration,
    ) -> Result<Vec<PageRecord>, ProviderError>;
}

// ============================================================================
// Kline History
// ============================================================================

/// Supplies daily candles, oldest first.
#[async_trait]
pub trait KlineHistoryFetcher: Send + Sync {
    async fn fetch(&self, code: &str, lookback_days: u32) -> Result<Vec<Candle>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_table_cell_text() {
        let table = ApiTable {
            fields: vec!["ts_code".into(), "close".into(), "pre_close".into()],
            items: vec![vec![json!("000001.SH"), json!(3012.5), json!(null)]],
        };
        assert_eq!(table.column("close"), Some(1));
        assert_eq!(table.column("missing"), None);
        assert_eq!(table.cell_text(0, 0), "000001.SH");
        assert_eq!(table.cell_text(0, 1), "3012.5");
        assert_eq!(table.cell_text(0, 2), "");
        assert_eq!(table.cell_text(3, 0), "");
    }
}
