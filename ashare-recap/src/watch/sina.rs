//! Sina real-time quotes (`hq.sinajs.cn`).
//!
//! The response is `var hq_str_sh600519="name,open,prev_close,current,high,low,...";`.
//! Only the numeric fields are read, so the GBK-encoded name is decoded lossily.

use async_trait::async_trait;
use chrono::Local;
use std::time::Duration;
use tracing::debug;

use super::{Quote, QuoteSource};
use crate::data::{split_code, Exchange, ProviderError};

const SINA_QUOTE_URL: &str = "https://hq.sinajs.cn/list=";

/// Requests without this referer are rejected.
const SINA_REFERER: &str = "https://finance.sina.com.cn/";

/// Sina list symbol, e.g. "600519" -> "sh600519".
///
/// Codes that already carry an `sh`/`sz`/`bj` prefix pass through.
pub fn to_sina_symbol(code: &str) -> Option<String> {
    let code = code.trim();
    let lower = code.to_ascii_lowercase();
    if ["sh", "sz", "bj"].iter().any(|p| lower.starts_with(p)) {
        return Some(lower);
    }
    let exchange = Exchange::of(code)?;
    let (digits, _) = split_code(code);
    Some(format!("{}{}", exchange.sina_prefix(), digits))
}

/// Parse one quote line. `None` when the security has no live quote.
pub fn parse_sina_quote(body: &str, time: String) -> Result<Option<Quote>, ProviderError> {
    let payload = match (body.find('"'), body.rfind('"')) {
        (Some(start), Some(end)) if end > start => &body[start + 1..end],
        _ => body,
    };

    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() < 6 || fields[3].trim().is_empty() {
        return Ok(None);
    }

    let number = |i: usize| -> Result<f64, ProviderError> {
        fields[i]
            .trim()
            .parse::<f64>()
            .map_err(|_| ProviderError::Malformed(format!("field {} is not a number: {:?}", i, fields[i])))
    };

    Ok(Some(Quote {
        time,
        current: number(3)?,
        high: number(4)?,
        low: number(5)?,
    }))
}

pub struct SinaQuoteSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl SinaQuoteSource {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, timeout }
    }
}

#[async_trait]
impl QuoteSource for SinaQuoteSource {
    async fn quote(&self, code: &str) -> Result<Option<Quote>, ProviderError> {
        let symbol = to_sina_symbol(code)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("Unrecognised code: {}", code)))?;
        let url = format!("{}{}", SINA_QUOTE_URL, symbol);
        debug!(url = %url, "Fetching sina quote");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::REFERER, SINA_REFERER)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Network(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let body = String::from_utf8_lossy(&bytes);

        let time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        parse_sina_quote(&body, time)
    }
}
