//! Core domain types for Gazette runs and documents.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// SourceId
// ---------------------------------------------------------------------------

/// Identifier of a configured retrieval source (e.g. `arxiv`, `web`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Retrieval request / outcome
// ---------------------------------------------------------------------------

/// Query parameters handed to a retrieval port. Opaque to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    /// Free-form query text.
    pub text: String,
    /// Upper bound on returned items, if the source honours one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    /// Source-specific extras (e.g. Tavily `topic`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// One branch of a run: which source, what to ask, and how long to wait.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub source: SourceId,
    pub query: RetrievalQuery,
    pub deadline: Duration,
}

/// Why a branch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    TransportError,
    InvalidResponse,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::TransportError => "transport error",
            Self::InvalidResponse => "invalid response",
        })
    }
}

/// Settled result of one branch. Produced once, never mutated.
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    Success(Vec<RetrievedItem>),
    Failure { kind: FailureKind, detail: String },
}

impl RetrievalOutcome {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Number of items carried by a success, zero for a failure.
    pub fn item_count(&self) -> usize {
        match self {
            Self::Success(items) => items.len(),
            Self::Failure { .. } => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// RetrievedItem
// ---------------------------------------------------------------------------

/// A single piece of content returned by a retrieval source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Source that produced this item.
    pub origin: SourceId,
    /// Stable dedup key (normalized URL or content hash).
    pub provenance: String,
    /// Item category (`paper`, `tool`, `framework`, `tutorial`, `news`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Key findings, for research papers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
}

impl RetrievedItem {
    /// Create an item with a provenance token derived from its URL.
    pub fn new(origin: SourceId, title: impl Into<String>, source_url: impl Into<String>) -> Self {
        let title = title.into();
        let source_url = source_url.into();
        let provenance = provenance_token(&source_url, &title);
        Self {
            title,
            summary: String::new(),
            source_url,
            published_at: None,
            origin,
            provenance,
            category: None,
            findings: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_findings(mut self, findings: impl Into<String>) -> Self {
        self.findings = Some(findings.into());
        self
    }

    /// Title and source URL must both be non-blank.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.source_url.trim().is_empty()
    }
}

/// Derive a dedup token for an item.
///
/// Parsable URLs normalize to `host/path?query` (scheme and fragment dropped,
/// host lowercased, trailing slash trimmed) so `http://` and `https://` links
/// to the same page collide. Anything else falls back to a SHA-256 of the
/// trimmed URL and title.
pub fn provenance_token(source_url: &str, title: &str) -> String {
    match Url::parse(source_url.trim()) {
        Ok(url) if url.host_str().is_some() => {
            let host = url.host_str().unwrap_or_default().to_lowercase();
            let path = url.path().trim_end_matches('/');
            match url.query() {
                Some(q) if !q.is_empty() => format!("{host}{path}?{q}"),
                _ => format!("{host}{path}"),
            }
        }
        _ => {
            let mut hasher = Sha256::new();
            hasher.update(source_url.trim().as_bytes());
            hasher.update(b"\n");
            hasher.update(title.trim().as_bytes());
            format!("sha256:{:x}", hasher.finalize())
        }
    }
}

// ---------------------------------------------------------------------------
// NewsletterDocument
// ---------------------------------------------------------------------------

/// Title block of a newsletter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterHeader {
    pub title: String,
    pub headline: String,
}

/// Coverage status of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SectionStatus {
    /// At least one item survived dedup.
    Populated,
    /// The source succeeded but contributed nothing new.
    Empty,
    /// The source's branch failed.
    Failed { kind: FailureKind, detail: String },
}

/// One source's contribution to the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub source: SourceId,
    /// Display heading (e.g. "Latest Research Papers").
    pub label: String,
    pub status: SectionStatus,
    #[serde(default)]
    pub items: Vec<RetrievedItem>,
}

/// A failed source as recorded in the document metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSource {
    pub source: SourceId,
    pub kind: FailureKind,
    pub detail: String,
}

/// Metadata block: which sources contributed, came back empty, or failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub populated: Vec<SourceId>,
    pub empty: Vec<SourceId>,
    pub failed: Vec<FailedSource>,
    /// Items removed because an earlier item had the same provenance token.
    pub duplicates_dropped: usize,
}

impl Coverage {
    pub fn is_partial(&self) -> bool {
        !self.empty.is_empty() || !self.failed.is_empty()
    }
}

/// The assembled digest. Built once per run and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterDocument {
    pub run_id: RunId,
    /// Prefix used for artifact names (e.g. `ai_newsletter`).
    pub document_type: String,
    pub generated_at: DateTime<Utc>,
    pub header: NewsletterHeader,
    pub sections: Vec<Section>,
    pub coverage: Coverage,
}

impl NewsletterDocument {
    pub fn total_items(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Formats and artifacts
// ---------------------------------------------------------------------------

/// Output format of a rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatTag {
    Html,
    Text,
    Json,
}

impl FormatTag {
    /// File extension used for this format's artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "txt",
            Self::Json => "json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for FormatTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FormatTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}': expected html, text or json")),
        }
    }
}

/// A rendered artifact written under its final name.
#[derive(Debug, Clone)]
pub struct PersistedArtifact {
    pub format: FormatTag,
    pub payload: Vec<u8>,
    pub path: PathBuf,
    /// Hex SHA-256 of `payload`.
    pub sha256: String,
}

impl PersistedArtifact {
    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn provenance_ignores_scheme_fragment_and_trailing_slash() {
        let a = provenance_token("https://Example.com/post/1/#top", "A");
        let b = provenance_token("http://example.com/post/1", "B");
        assert_eq!(a, b);
        assert_eq!(a, "example.com/post/1");
    }

    #[test]
    fn provenance_keeps_query() {
        let a = provenance_token("https://example.com/watch?v=1", "x");
        let b = provenance_token("https://example.com/watch?v=2", "x");
        assert_ne!(a, b);
    }

    #[test]
    fn provenance_falls_back_to_hash() {
        let token = provenance_token("not a url", "Title");
        assert!(token.starts_with("sha256:"));
        assert_eq!(token.len(), "sha256:".len() + 64);
    }

    #[test]
    fn item_validity() {
        let ok = RetrievedItem::new("web".into(), "Title", "https://example.com");
        assert!(ok.is_valid());

        let blank_title = RetrievedItem::new("web".into(), "   ", "https://example.com");
        assert!(!blank_title.is_valid());

        let blank_url = RetrievedItem::new("web".into(), "Title", "");
        assert!(!blank_url.is_valid());
    }

    #[test]
    fn format_tag_parsing_and_extension() {
        assert_eq!("HTML".parse::<FormatTag>().unwrap(), FormatTag::Html);
        assert_eq!("txt".parse::<FormatTag>().unwrap(), FormatTag::Text);
        assert_eq!(FormatTag::Text.extension(), "txt");
        assert!("pdf".parse::<FormatTag>().is_err());
    }

    #[test]
    fn section_status_serialization() {
        let section = Section {
            source: "arxiv".into(),
            label: "Papers".into(),
            status: SectionStatus::Failed {
                kind: FailureKind::Timeout,
                detail: "deadline of 60s elapsed".into(),
            },
            items: vec![],
        };

        let json = serde_json::to_value(&section).expect("serialize");
        assert_eq!(json["status"]["state"], "failed");
        assert_eq!(json["status"]["kind"], "timeout");

        let parsed: Section = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed.status, section.status);
    }
}
