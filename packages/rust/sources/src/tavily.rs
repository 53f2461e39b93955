//! Tavily web search adapter.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use gazette_core::RetrievalPort;
use gazette_shared::{RetrievalQuery, RetrievedItem, SourceError, SourceId};

pub const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

const DEFAULT_MAX_RESULTS: usize = 5;
const DEFAULT_TOPIC: &str = "general";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_depth: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

/// Every field is optional: a result missing its title or URL is passed on
/// blank and dropped by the branch runner, not allowed to fail the response.
#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
}

/// Web search backed by the Tavily API.
///
/// Recognised query params: `topic` (default `general`), `search_depth`,
/// `days`, and `category`, which is stamped onto every returned item.
pub struct TavilySource {
    client: Client,
    endpoint: String,
    api_key: String,
    source: SourceId,
}

impl TavilySource {
    pub fn new(client: Client, source: SourceId, api_key: impl Into<String>) -> Self {
        Self::with_endpoint(client, source, api_key, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(
        client: Client,
        source: SourceId,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            source,
        }
    }
}

#[async_trait]
impl RetrievalPort for TavilySource {
    fn name(&self) -> &str {
        "tavily"
    }

    #[instrument(skip_all, fields(source = %self.source, query = %query.text))]
    async fn run(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedItem>, SourceError> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query: &query.text,
            max_results: query.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            topic: query.params.get("topic").map_or(DEFAULT_TOPIC, String::as_str),
            search_depth: query.params.get("search_depth").map(String::as_str),
            days: query.params.get("days").and_then(|d| d.parse().ok()),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transport(format!("{}: failed to read body: {e}", self.endpoint)))?;

        let parsed: SearchResponse = serde_json::from_slice(&body)
            .map_err(|e| SourceError::InvalidResponse(format!("undecodable search response: {e}")))?;

        let category = query.params.get("category");
        let items: Vec<RetrievedItem> = parsed
            .results
            .into_iter()
            .map(|r| {
                let title = r.title.as_deref().unwrap_or_default().trim();
                let url = r.url.as_deref().unwrap_or_default().trim();
                let mut item = RetrievedItem::new(self.source.clone(), title, url)
                    .with_summary(r.content.as_deref().unwrap_or_default().trim());
                if let Some(at) = r.published_date.as_deref().and_then(parse_published) {
                    item = item.with_published_at(at);
                }
                if let Some(category) = category {
                    item = item.with_category(category.clone());
                }
                item
            })
            .collect();

        debug!(count = items.len(), "parsed Tavily results");
        Ok(items)
    }
}

/// Tavily reports dates as RFC 3339, RFC 2822, or a bare `YYYY-MM-DD`.
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}
