//! arXiv export API adapter.
//!
//! Queries `export.arxiv.org/api/query` and maps each Atom `<entry>` to a
//! [`RetrievedItem`] with category `paper`.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, instrument};

use gazette_core::RetrievalPort;
use gazette_shared::{RetrievalQuery, RetrievedItem, SourceError, SourceId};

pub const DEFAULT_ENDPOINT: &str = "https://export.arxiv.org/api/query";

/// Results requested when the query carries no explicit limit.
const DEFAULT_MAX_RESULTS: usize = 5;

// ---------------------------------------------------------------------------
// Atom patterns (compiled once)
// ---------------------------------------------------------------------------

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>").expect("entry regex"));

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").expect("title regex"));

static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<summary\b[^>]*>(.*?)</summary>").expect("summary regex"));

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<id\b[^>]*>(.*?)</id>").expect("id regex"));

static PUBLISHED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<published\b[^>]*>(.*?)</published>").expect("published regex")
});

static FEED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<feed\b").expect("feed regex"));

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("entity regex"));

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

// ---------------------------------------------------------------------------
// ArxivSource
// ---------------------------------------------------------------------------

/// Literature search backed by the arXiv Atom API.
pub struct ArxivSource {
    client: Client,
    endpoint: String,
    source: SourceId,
}

impl ArxivSource {
    pub fn new(client: Client, source: SourceId) -> Self {
        Self::with_endpoint(client, source, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(client: Client, source: SourceId, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            source,
        }
    }
}

#[async_trait]
impl RetrievalPort for ArxivSource {
    fn name(&self) -> &str {
        "arxiv"
    }

    #[instrument(skip_all, fields(source = %self.source, query = %query.text))]
    async fn run(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedItem>, SourceError> {
        let max_results = query.max_results.unwrap_or(DEFAULT_MAX_RESULTS).to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("search_query", query.text.as_str()),
            ("sortBy", "submittedDate"),
            ("sortOrder", "descending"),
            ("max_results", max_results.as_str()),
        ];
        params.extend(query.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
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
            .text()
            .await
            .map_err(|e| SourceError::Transport(format!("{}: failed to read body: {e}", self.endpoint)))?;

        let items = parse_feed(&body, &self.source)?;
        debug!(count = items.len(), "parsed arXiv feed");
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse an Atom feed body into items.
///
/// Entries without a title or id are skipped. A body with no `<feed>` element
/// is an invalid response.
pub fn parse_feed(body: &str, source: &SourceId) -> Result<Vec<RetrievedItem>, SourceError> {
    if !FEED_RE.is_match(body) {
        return Err(SourceError::InvalidResponse(
            "response is not an Atom feed".into(),
        ));
    }

    let items = ENTRY_RE
        .captures_iter(body)
        .filter_map(|cap| {
            let entry = cap.get(1)?.as_str();
            let title = field(&TITLE_RE, entry)?;
            let url = field(&ID_RE, entry)?;

            let mut item = RetrievedItem::new(source.clone(), title, url).with_category("paper");
            if let Some(summary) = field(&SUMMARY_RE, entry) {
                item = item.with_summary(summary);
            }
            if let Some(published) = field(&PUBLISHED_RE, entry)
                .and_then(|p| DateTime::parse_from_rfc3339(&p).ok())
            {
                item = item.with_published_at(published.with_timezone(&Utc));
            }
            Some(item)
        })
        .collect();

    Ok(items)
}

/// First match of `re` in `entry`, entity-decoded and whitespace-collapsed.
fn field(re: &Regex, entry: &str) -> Option<String> {
    let raw = re.captures(entry)?.get(1)?.as_str();
    let text = collapse_whitespace(&decode_entities(raw));
    (!text.is_empty()).then_some(text)
}

fn collapse_whitespace(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").into_owned()
}

/// Decode the XML predefined entities and numeric character references.
fn decode_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => name
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=all:agents</title>
  <id>http://arxiv.org/api/query-id</id>
  <entry>
    <id>http://arxiv.org/abs/2403.01234v1</id>
    <published>2024-03-02T18:00:00Z</published>
    <title>Planning with
      Multi-Agent   Systems &amp; Tools</title>
    <summary>  We study agents that &lt;plan&gt; together.
    </summary>
    <arxiv:comment>12 pages, 4 figures</arxiv:comment>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2403.05678v2</id>
    <published>not a date</published>
    <title>Tool Use &#8212; Revisited</title>
    <summary>Second abstract.</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2403.09999v1</id>
    <title>   </title>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_and_skips_untitled() {
        let items = parse_feed(FEED, &"arxiv".into()).unwrap();

        assert_eq!(items.len(), 2);
        let first = &items[0];
        assert_eq!(first.title, "Planning with Multi-Agent Systems & Tools");
        assert_eq!(first.summary, "We study agents that <plan> together.");
        assert_eq!(first.source_url, "http://arxiv.org/abs/2403.01234v1");
        assert_eq!(first.category.as_deref(), Some("paper"));
        // Page counts in `arxiv:comment` are not findings.
        assert!(first.findings.is_none());
        assert_eq!(
            first.published_at.map(|d| d.to_rfc3339()),
            Some("2024-03-02T18:00:00+00:00".to_string())
        );
        assert_eq!(first.provenance, "arxiv.org/abs/2403.01234v1");

        assert_eq!(items[1].title, "Tool Use \u{2014} Revisited");
        assert!(items[1].published_at.is_none());
    }

    #[test]
    fn empty_feed_is_not_an_error() {
        let body = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>none</title></feed>"#;
        assert!(parse_feed(body, &"arxiv".into()).unwrap().is_empty());
    }

    #[test]
    fn non_feed_body_is_invalid() {
        let err = parse_feed("<html><body>rate limited</body></html>", &"arxiv".into()).unwrap_err();
        assert!(matches!(err, SourceError::InvalidResponse(_)));
    }

    #[test]
    fn unknown_entities_are_kept_verbatim() {
        assert_eq!(decode_entities("a &nbsp; b &#65;"), "a &nbsp; b A");
    }

    #[tokio::test]
    async fn fetches_with_expected_query() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/query"))
            .and(wiremock::matchers::query_param("search_query", "all:agents"))
            .and(wiremock::matchers::query_param("sortBy", "submittedDate"))
            .and(wiremock::matchers::query_param("sortOrder", "descending"))
            .and(wiremock::matchers::query_param("max_results", "3"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;

        let source = ArxivSource::with_endpoint(
            Client::new(),
            "arxiv".into(),
            format!("{}/api/query", server.uri()),
        );
        let items = source
            .run(&RetrievalQuery::new("all:agents").with_max_results(3))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].origin.as_str(), "arxiv");
    }

    #[tokio::test]
    async fn http_error_is_transport() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = ArxivSource::with_endpoint(Client::new(), "arxiv".into(), server.uri());
        let err = source.run(&RetrievalQuery::new("all:agents")).await.unwrap_err();

        match err {
            SourceError::Transport(msg) => assert!(msg.contains("503")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("{\"oops\": true}"))
            .mount(&server)
            .await;

        let source = ArxivSource::with_endpoint(Client::new(), "arxiv".into(), server.uri());
        let err = source.run(&RetrievalQuery::new("all:agents")).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidResponse(_)));
    }
}
