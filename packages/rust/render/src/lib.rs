//! Render adapters for Gazette documents.
//!
//! [`TemplateRenderer`] implements [`RenderPort`] for every [`FormatTag`]:
//! a self-contained HTML page, a plain-text digest for email bodies, and the
//! document itself as pretty-printed JSON. Rendering is a pure function of the
//! document; the only date shown is the document's generation timestamp.

mod html;
mod text;

use chrono::{DateTime, Utc};
use tracing::debug;

use gazette_core::RenderPort;
use gazette_shared::{FormatTag, GazetteError, NewsletterDocument, Result, RetrievedItem, Section};

/// Renders documents with the built-in HTML and text layouts.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    /// Closing line printed in the footer.
    tagline: Option<String>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tagline(mut self, tagline: impl Into<String>) -> Self {
        self.tagline = Some(tagline.into());
        self
    }

    pub(crate) fn tagline(&self) -> &str {
        self.tagline
            .as_deref()
            .unwrap_or("Stay updated with the latest in AI and agent technologies!")
    }
}

impl RenderPort for TemplateRenderer {
    fn render(&self, doc: &NewsletterDocument, format: FormatTag) -> Result<Vec<u8>> {
        let bytes = match format {
            FormatTag::Html => html::render(self, doc).into_bytes(),
            FormatTag::Text => text::render(self, doc).into_bytes(),
            FormatTag::Json => serde_json::to_vec_pretty(doc)
                .map_err(|e| GazetteError::render(format, e.to_string()))?,
        };
        debug!(%format, size = bytes.len(), "rendered document");
        Ok(bytes)
    }
}

// ---------------------------------------------------------------------------
// Shared presentation helpers
// ---------------------------------------------------------------------------

/// Long-form date, e.g. `March 14, 2026`.
pub(crate) fn long_date(at: DateTime<Utc>) -> String {
    at.format("%B %d, %Y").to_string()
}

pub(crate) fn item_date(item: &RetrievedItem) -> String {
    item.published_at.map_or_else(|| "Recent".to_string(), long_date)
}

pub(crate) fn is_paper(item: &RetrievedItem) -> bool {
    item.category.as_deref() == Some("paper")
}

/// Badge text for an item's category, if it has one.
pub(crate) fn category_badge(item: &RetrievedItem) -> Option<String> {
    let category = item.category.as_deref()?.trim();
    if category.is_empty() {
        return None;
    }
    if category == "paper" {
        return Some("Research Paper".to_string());
    }
    let icon = match category {
        "tool" => "🛠️",
        "framework" => "⚡",
        "tutorial" => "📖",
        "news" => "📰",
        _ => "🔹",
    };
    Some(format!("{icon} {}", title_case(category)))
}

/// Heading icon: papers get a book, everything else a rocket.
pub(crate) fn section_icon(section: &Section) -> &'static str {
    if section.items.first().is_some_and(is_paper) {
        "📚"
    } else {
        "🚀"
    }
}

pub(crate) fn link_label(item: &RetrievedItem) -> &'static str {
    if is_paper(item) { "Read Paper →" } else { "Learn More →" }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;
    use gazette_shared::{
        Coverage, FailedSource, FailureKind, NewsletterHeader, RunId, SectionStatus, SourceId,
    };

    use super::*;

    pub(crate) fn document() -> NewsletterDocument {
        let paper = RetrievedItem::new(SourceId::new("arxiv"), "Agents <Plan> & Act", "https://arxiv.org/abs/1")
            .with_summary("We study planning.")
            .with_category("paper")
            .with_findings("Planning helps.")
            .with_published_at(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        let tool = RetrievedItem::new(SourceId::new("web"), "New SDK", "https://news.example/sdk?a=1&b=2")
            .with_summary("A framework for agents.")
            .with_category("framework");

        NewsletterDocument {
            run_id: RunId::new(),
            document_type: "ai_newsletter".into(),
            generated_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            header: NewsletterHeader {
                title: "AI Agents Newsletter".into(),
                headline: "Latest developments".into(),
            },
            sections: vec![
                Section {
                    source: SourceId::new("arxiv"),
                    label: "Latest Research Papers".into(),
                    status: SectionStatus::Populated,
                    items: vec![paper],
                },
                Section {
                    source: SourceId::new("web"),
                    label: "AI Tools & Updates".into(),
                    status: SectionStatus::Populated,
                    items: vec![tool],
                },
                Section {
                    source: SourceId::new("blogs"),
                    label: "Blogs".into(),
                    status: SectionStatus::Failed {
                        kind: FailureKind::Timeout,
                        detail: "no response within 60000ms".into(),
                    },
                    items: vec![],
                },
                Section {
                    source: SourceId::new("forums"),
                    label: "Forums".into(),
                    status: SectionStatus::Empty,
                    items: vec![],
                },
            ],
            coverage: Coverage {
                populated: vec![SourceId::new("arxiv"), SourceId::new("web")],
                empty: vec![SourceId::new("forums")],
                failed: vec![FailedSource {
                    source: SourceId::new("blogs"),
                    kind: FailureKind::Timeout,
                    detail: "no response within 60000ms".into(),
                }],
                duplicates_dropped: 0,
            },
        }
    }
}
