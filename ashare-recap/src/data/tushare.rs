//! Tushare Pro API client.
//!
//! # API Documentation
//! https://tushare.pro/document/2
//!
//! Every endpoint is a POST of `{api_name, token, params, fields}` to the same
//! URL; the answer is `{code, msg, data: {fields, items}}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::provider::{ApiTable, MarketApiClient, ProviderError};

const TUSHARE_API_URL: &str = "http://api.tushare.pro";

/// Tushare codes that mean the token is missing, invalid or lacks points.
const AUTH_ERROR_CODES: &[i32] = &[-2001, 40101, 40203];

/// Tushare Pro client
pub struct TushareClient {
    token: String,
    client: reqwest::Client,
    base_url: String,
}

impl TushareClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            token: token.into(),
            client,
            base_url: TUSHARE_API_URL.to_string(),
        }
    }

    /// Create from config; `None` when no token is configured.
    pub fn from_config(config: &ashare_common::Config) -> Option<Self> {
        config
            .sources
            .tushare_token
            .clone()
            .filter(|t| !t.is_empty())
            .map(|token| Self::new(token, config.sources.call_timeout()))
    }
}

#[async_trait]
impl MarketApiClient for TushareClient {
    fn name(&self) -> &str {
        "tushare"
    }

    async fn query(
        &self,
        endpoint: &str,
        params: &HashMap<String, String>,
    ) -> Result<ApiTable, ProviderError> {
        let mut params = params.clone();
        let fields = params.remove("fields");

        let request = TushareRequest {
            api_name: endpoint.to_string(),
            token: self.token.clone(),
            params,
            fields,
        };

        debug!(api_name = endpoint, "Calling Tushare");

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "Tushare HTTP {}",
                response.status()
            )));
        }

        let body: TushareResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse Tushare response: {}", e)))?;

        into_table(body)
    }
}

fn into_table(body: TushareResponse) -> Result<ApiTable, ProviderError> {
    if body.code != 0 {
        let msg = format!("{} - {}", body.code, body.msg.unwrap_or_default());
        if AUTH_ERROR_CODES.contains(&body.code) {
            return Err(ProviderError::Auth(msg));
        }
        return Err(ProviderError::Network(format!("Tushare API returned error: {}", msg)));
    }

    body.data
        .ok_or_else(|| ProviderError::Malformed("Tushare response has no data".into()))
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct TushareRequest {
    api_name: String,
    token: String,
    params: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i32,
    msg: Option<String>,
    data: Option<ApiTable>,
}
