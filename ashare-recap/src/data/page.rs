//! HTTP page extraction with CSS selectors.
//!
//! Fetches the page with a rotated User-Agent and pulls cells out of every
//! element matching the row selector. Pages that only render their tables
//! with JavaScript yield `SelectorNotFound`, which the resolver treats like
//! any other fallback failure.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;

use super::provider::{PageCell, PageContentProvider, PageRecord, ProviderError, RowSelector};

pub struct HtmlPageProvider {
    client: reqwest::Client,
    user_agents: Vec<String>,
}

impl HtmlPageProvider {
    pub fn new(user_agents: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .gzip(true)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            user_agents,
        }
    }

    pub fn from_config(config: &ashare_common::Config) -> Self {
        Self::new(config.sources.user_agents.clone())
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    async fn fetch_html(&self, url: &str) -> Result<String, ProviderError> {
        let mut request = self.client.get(url);
        if let Some(ua) = self.pick_user_agent() {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Network(format!("HTTP {}", response.status())));
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read body: {}", e)))
    }
}

#[async_trait]
impl PageContentProvider for HtmlPageProvider {
    async fn extract(
        &self,
        url: &str,
        selector: &RowSelector,
        timeout: Duration,
    ) -> Result<Vec<PageRecord>, ProviderError> {
        debug!(url = url, row_selector = %selector.row, "Extracting page rows");

        let html = tokio::time::timeout(timeout, self.fetch_html(url))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))??;

        extract_rows(&html, selector)
    }
}

fn parse_selector(css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css)
        .map_err(|e| ProviderError::InvalidRequest(format!("Invalid CSS selector {}: {:?}", css, e)))
}

/// Apply a row selector to an HTML document.
pub fn extract_rows(html: &str, selector: &RowSelector) -> Result<Vec<PageRecord>, ProviderError> {
    let row_sel = parse_selector(&selector.row)?;
    let cell_sel = parse_selector(&selector.cell)?;
    let link_sel = parse_selector("a[href]")?;

    let document = Html::parse_document(html);
    let records: Vec<PageRecord> = document
        .select(&row_sel)
        .map(|row| PageRecord {
            cells: row
                .select(&cell_sel)
                .map(|cell| to_cell(cell, &link_sel))
                .collect(),
        })
        .collect();

    if records.is_empty() {
        return Err(ProviderError::SelectorNotFound(selector.row.clone()));
    }
    Ok(records)
}

fn to_cell(cell: ElementRef<'_>, link_sel: &Selector) -> PageCell {
    let text = cell
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let href = cell
        .value()
        .attr("href")
        .or_else(|| {
            cell.select(link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
        })
        .map(str::to_string);

    PageCell { text, href }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD_PAGE: &str = r#"
        <html><body>
        <table><tbody>
          <tr><td>1</td><td><a href="//quote.eastmoney.com/bk/90.BK0815.html">昨日连板</a></td><td>5.12%</td></tr>
          <tr><td>2</td><td><a href="//quote.eastmoney.com/bk/90.BK1036.html">半导体</a></td><td>-</td></tr>
        </tbody></table>
        </body></html>
    "#;

    #[test]
    fn test_extract_rows_with_links() {
        let records = extract_rows(BOARD_PAGE, &RowSelector::table_rows("table tbody tr")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cells.len(), 3);
        assert_eq!(records[0].cells[1].text, "昨日连板");
        assert_eq!(
            records[0].cells[1].href.as_deref(),
            Some("//quote.eastmoney.com/bk/90.BK0815.html")
        );
        assert_eq!(records[1].cells[2].text, "-");
        assert!(records[1].cells[0].href.is_none());
    }

    #[test]
    fn test_anchor_cells() {
        let html = r#"<div class="content_area"><div class="title"><a href="https://news.cctv.com/a.shtml"> 标题一 </a></div></div>"#;
        let records = extract_rows(html, &RowSelector::new(".content_area .title", "a")).unwrap();
        assert_eq!(records[0].cells[0].text, "标题一");
        assert_eq!(
            records[0].cells[0].href.as_deref(),
            Some("https://news.cctv.com/a.shtml")
        );
    }

    #[test]
    fn test_no_rows_is_selector_not_found() {
        let err = extract_rows("<html></html>", &RowSelector::table_rows(".table-wrap .tbody .tr"))
            .unwrap_err();
        assert_eq!(err, ProviderError::SelectorNotFound(".table-wrap .tbody .tr".into()));
    }

    #[test]
    fn test_invalid_selector() {
        let err = extract_rows("<html></html>", &RowSelector::table_rows("tr[")).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_user_agent_rotation_uses_configured_list() {
        let provider = HtmlPageProvider::new(vec!["UA-1".into(), "UA-2".into()]);
        for _ in 0..10 {
            let ua = provider.pick_user_agent().unwrap();
            assert!(ua == "UA-1" || ua == "UA-2");
        }
        assert!(HtmlPageProvider::new(Vec::new()).pick_user_agent().is_none());
    }
}
