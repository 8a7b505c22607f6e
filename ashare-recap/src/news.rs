//! Headline digest from the CCTV news front page.

use chrono::NaiveDateTime;
use reqwest::Url;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::data::{PageContentProvider, PageRecord, ProviderError, RowSelector};

pub const NEWS_URL: &str = "https://news.cctv.com/";
pub const HEADLINE_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum NewsError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("No headlines extracted, page structure changed or blocked")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsHeadline {
    pub title: String,
    pub url: String,
}

pub struct NewsDigest {
    pages: Arc<dyn PageContentProvider>,
    timeout: Duration,
}

impl NewsDigest {
    pub fn new(pages: Arc<dyn PageContentProvider>, timeout: Duration) -> Self {
        Self { pages, timeout }
    }

    pub async fn fetch_headlines(&self) -> Result<Vec<NewsHeadline>, NewsError> {
        let selector = RowSelector::new(".content_area .title", "a");
        let rows = self.pages.extract(NEWS_URL, &selector, self.timeout).await?;

        let headlines = headlines_from_rows(&rows);
        if headlines.is_empty() {
            return Err(NewsError::Empty);
        }

        info!(count = headlines.len(), "Headlines extracted");
        Ok(headlines)
    }
}

/// First link of each of the first twenty rows; incomplete rows are dropped.
pub fn headlines_from_rows(rows: &[PageRecord]) -> Vec<NewsHeadline> {
    let base = Url::parse(NEWS_URL).ok();

    rows.iter()
        .take(HEADLINE_LIMIT)
        .filter_map(|row| {
            let cell = row.cell(0)?;
            let title = cell.text.trim();
            let href = cell.href.as_deref().map(str::trim).unwrap_or_default();
            if title.is_empty() || href.is_empty() {
                debug!(title, "Skipping headline without title or link");
                return None;
            }
            Some(NewsHeadline {
                title: title.to_string(),
                url: absolute_url(base.as_ref(), href),
            })
        })
        .collect()
}

fn absolute_url(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

pub fn render_news_at(headlines: &[NewsHeadline], at: NaiveDateTime) -> String {
    let mut out = format!(
        "# {} {} 中央新闻前{}条\n\n",
        at.format("%Y-%m-%d"),
        at.format("%H-%M-%S"),
        HEADLINE_LIMIT
    );
    for (i, headline) in headlines.iter().enumerate() {
        let _ = writeln!(out, "### {}. [{}]({})\n", i + 1, headline.title, headline.url);
    }
    out
}
