//! Eastmoney push2 APIs: board/stock lists and daily klines.
//!
//! No API key required.
//!
//! # Data Sources
//! - Lists (`clist`): push2.eastmoney.com, one JSON object per row keyed by `fNN`
//! - Daily K-line: push2his.eastmoney.com, one CSV string per candle

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{ApiTable, KlineHistoryFetcher, MarketApiClient, ProviderError};
use super::{Candle, Exchange};

// ============================================================================
// Constants
// ============================================================================

/// Eastmoney real-time API root; the endpoint name is spliced in.
const EASTMONEY_PUSH2_URL: &str = "https://push2.eastmoney.com/api/qt";

/// Eastmoney historical data API
const EASTMONEY_KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";

const EASTMONEY_REFERER: &str = "https://quote.eastmoney.com/";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// ============================================================================
// Symbol Mapping
// ============================================================================

/// Convert a security code to eastmoney `secid`.
///
/// "600519" -> "1.600519", "000001" -> "0.000001", "000001.SH" -> "1.000001"
pub fn to_secid(code: &str) -> Option<String> {
    let exchange = Exchange::of(code)?;
    let (digits, _) = super::split_code(code);
    Some(format!("{}.{}", exchange.eastmoney_market(), digits))
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ============================================================================
// List API
// ============================================================================

/// Client for push2 list endpoints such as `clist`.
///
/// The requested columns come from the `fields` parameter; each returned
/// object is laid out in that order.
pub struct EastmoneyClient {
    client: reqwest::Client,
    base_url: String,
}

impl EastmoneyClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: EASTMONEY_PUSH2_URL.to_string(),
        }
    }
}

#[async_trait]
impl MarketApiClient for EastmoneyClient {
    fn name(&self) -> &str {
        "eastmoney"
    }

    async fn query(
        &self,
        endpoint: &str,
        params: &HashMap<String, String>,
    ) -> Result<ApiTable, ProviderError> {
        let fields: Vec<String> = params
            .get("fields")
            .map(|f| f.split(',').map(|s| s.trim().to_string()).collect())
            .ok_or_else(|| ProviderError::InvalidRequest("`fields` parameter is required".into()))?;

        let url = format!("{}/{}/get", self.base_url, endpoint);
        debug!(url = %url, "Fetching list from eastmoney");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::REFERER, EASTMONEY_REFERER)
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Network(format!("HTTP {}", response.status())));
        }

        let body: EastmoneyListResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {}", e)))?;

        list_to_table(body, fields)
    }
}

fn list_to_table(body: EastmoneyListResponse, fields: Vec<String>) -> Result<ApiTable, ProviderError> {
    if body.rc != 0 {
        return Err(ProviderError::Network(format!("Eastmoney API error: rc={}", body.rc)));
    }

    // `data` is null when the board has no members
    let diff = match body.data {
        Some(data) => data.diff,
        None => serde_json::Value::Null,
    };

    let objects: Vec<serde_json::Map<String, serde_json::Value>> = match diff {
        serde_json::Value::Array(rows) => rows
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(o) => Some(o),
                _ => None,
            })
            .collect(),
        // With np=0 the rows come keyed by position
        serde_json::Value::Object(map) => {
            let mut keyed: Vec<(usize, serde_json::Map<String, serde_json::Value>)> = map
                .into_iter()
                .filter_map(|(k, v)| match (k.parse::<usize>(), v) {
                    (Ok(i), serde_json::Value::Object(o)) => Some((i, o)),
                    _ => None,
                })
                .collect();
            keyed.sort_by_key(|(i, _)| *i);
            keyed.into_iter().map(|(_, o)| o).collect()
        }
        serde_json::Value::Null => Vec::new(),
        other => {
            return Err(ProviderError::Malformed(format!(
                "Unexpected diff payload: {}",
                other
            )))
        }
    };

    let items = objects
        .iter()
        .map(|obj| {
            fields
                .iter()
                .map(|f| obj.get(f).cloned().unwrap_or(serde_json::Value::Null))
                .collect()
        })
        .collect();

    Ok(ApiTable { fields, items })
}

// ============================================================================
// Kline Fetcher
// ============================================================================

/// Daily forward-adjusted klines from push2his.
pub struct EastmoneyKlineFetcher {
    client: reqwest::Client,
}

impl EastmoneyKlineFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
        }
    }

    fn kline_url(secid: &str, beg: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}?secid={}&fields1=f1,f2,f3,f4,f5,f6&fields2=f51,f52,f53,f54,f55,f56,f57,f58,f59&klt=101&fqt=1&beg={}&end={}",
            EASTMONEY_KLINE_URL,
            secid,
            beg.format("%Y%m%d"),
            end.format("%Y%m%d"),
        )
    }
}

#[async_trait]
impl KlineHistoryFetcher for EastmoneyKlineFetcher {
    /// Fetch the candles of the last `lookback_days` calendar days.
    async fn fetch(&self, code: &str, lookback_days: u32) -> Result<Vec<Candle>, ProviderError> {
        let secid = to_secid(code)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("Invalid security code: {}", code)))?;

        let end = Local::now().date_naive();
        let beg = end - ChronoDuration::days(i64::from(lookback_days));
        let url = Self::kline_url(&secid, beg, end);

        debug!(url = %url, code = code, "Fetching kline from eastmoney");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::REFERER, EASTMONEY_REFERER)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Network(format!("HTTP {}", response.status())));
        }

        let data: EastmoneyKlineResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {}", e)))?;

        if data.rc != 0 {
            return Err(ProviderError::Network(format!("Eastmoney API error: rc={}", data.rc)));
        }

        let klines = data.data.and_then(|d| d.klines).unwrap_or_default();
        parse_klines(&klines)
    }
}

/// Parse eastmoney kline strings into candles, oldest first.
///
/// Format: "2024-01-02,10.50,10.80,10.90,10.40,1000000,10500000.00,4.76,2.86"
/// Fields: date,open,close,high,low,volume,amount,amplitude,pct_change
fn parse_klines(klines: &[String]) -> Result<Vec<Candle>, ProviderError> {
    let mut candles = Vec::with_capacity(klines.len());

    for line in klines {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 7 {
            warn!(line = line.as_str(), "Invalid kline format, skipping");
            continue;
        }

        let date = NaiveDate::parse_from_str(parts[0], "%Y-%m-%d")
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse date: {}", e)))?;
        let num = |i: usize, field: &str| -> Result<f64, ProviderError> {
            parts[i]
                .parse::<f64>()
                .map_err(|e| ProviderError::Malformed(format!("Failed to parse {}: {}", field, e)))
        };

        candles.push(Candle {
            date,
            open: num(1, "open")?,
            close: num(2, "close")?,
            high: num(3, "high")?,
            low: num(4, "low")?,
            volume: num(5, "volume")?,
            amount: num(6, "amount")?,
            pct_change: parts.get(8).and_then(|p| p.parse().ok()).unwrap_or(0.0),
        });
    }

    candles.sort_by_key(|c| c.date);
    Ok(candles)
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct EastmoneyListResponse {
    #[serde(default)]
    rc: i32,
    data: Option<EastmoneyListData>,
}

#[derive(Debug, Deserialize)]
struct EastmoneyListData {
    #[serde(default)]
    diff: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EastmoneyKlineResponse {
    #[serde(default)]
    rc: i32,
    data: Option<EastmoneyKlineData>,
}

#[derive(Debug, Deserialize)]
struct EastmoneyKlineData {
    klines: Option<Vec<String>>,
}
