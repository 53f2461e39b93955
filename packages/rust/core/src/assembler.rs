//! Document assembler.
//!
//! Turns a [`JoinedResult`] into a [`NewsletterDocument`]: one section per
//! source in priority order, items deduplicated by provenance token across
//! the whole document, failures annotated rather than dropped. Total: every
//! joined result produces a document.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use gazette_shared::{
    Coverage, FailedSource, NewsletterDocument, NewsletterHeader, RetrievalOutcome, RunId,
    Section, SectionStatus, SourceId,
};

use crate::join::JoinedResult;

/// Static inputs the assembler needs besides the joined outcomes.
#[derive(Debug, Clone)]
pub struct DocumentTemplate {
    /// Artifact name prefix (e.g. `ai_newsletter`).
    pub document_type: String,
    pub header: NewsletterHeader,
    /// Section headings per source. Missing entries fall back to the source id.
    pub labels: HashMap<SourceId, String>,
}

/// Build the document for one run.
///
/// Sections follow the order of `joined` (the configured priority list).
/// The first item carrying a given provenance token wins; later ones,
/// in the same or a later section, are dropped and counted.
#[instrument(skip_all, fields(%run_id, sources = joined.len()))]
pub fn assemble(
    joined: &JoinedResult,
    template: &DocumentTemplate,
    run_id: RunId,
    generated_at: DateTime<Utc>,
) -> NewsletterDocument {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut coverage = Coverage::default();
    let mut sections = Vec::with_capacity(joined.len());

    for entry in joined.iter() {
        let label = template
            .labels
            .get(&entry.source)
            .cloned()
            .unwrap_or_else(|| entry.source.to_string());

        let (status, items) = match &entry.outcome {
            RetrievalOutcome::Success(items) => {
                let kept: Vec<_> = items
                    .iter()
                    .filter(|item| seen.insert(item.provenance.as_str()))
                    .cloned()
                    .collect();
                let dropped = items.len() - kept.len();
                if dropped > 0 {
                    debug!(source = %entry.source, dropped, "duplicate items removed");
                }
                coverage.duplicates_dropped += dropped;

                if kept.is_empty() {
                    coverage.empty.push(entry.source.clone());
                    (SectionStatus::Empty, kept)
                } else {
                    coverage.populated.push(entry.source.clone());
                    (SectionStatus::Populated, kept)
                }
            }
            RetrievalOutcome::Failure { kind, detail } => {
                coverage.failed.push(FailedSource {
                    source: entry.source.clone(),
                    kind: *kind,
                    detail: detail.clone(),
                });
                (
                    SectionStatus::Failed {
                        kind: *kind,
                        detail: detail.clone(),
                    },
                    Vec::new(),
                )
            }
        };

        sections.push(Section {
            source: entry.source.clone(),
            label,
            status,
            items,
        });
    }

    let header = annotate_header(&template.header, &sections);

    let doc = NewsletterDocument {
        run_id,
        document_type: template.document_type.clone(),
        generated_at,
        header,
        sections,
        coverage,
    };

    info!(
        items = doc.total_items(),
        populated = doc.coverage.populated.len(),
        empty = doc.coverage.empty.len(),
        failed = doc.coverage.failed.len(),
        duplicates = doc.coverage.duplicates_dropped,
        "document assembled"
    );
    doc
}

/// Append a note naming the failed sections, by label, to the headline.
fn annotate_header(header: &NewsletterHeader, sections: &[Section]) -> NewsletterHeader {
    let names: Vec<&str> = sections
        .iter()
        .filter(|s| matches!(s.status, SectionStatus::Failed { .. }))
        .map(|s| s.label.as_str())
        .collect();
    if names.is_empty() {
        return header.clone();
    }
    let verb = if names.len() == 1 { "search" } else { "searches" };
    NewsletterHeader {
        title: header.title.clone(),
        headline: format!(
            "{} (Note: {} {verb} failed, results may be incomplete)",
            header.headline,
            names.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use gazette_shared::FailureKind;

    use super::*;
    use crate::branch::SettledBranch;
    use crate::test_support::item;

    fn settled(source: &str, outcome: RetrievalOutcome) -> SettledBranch {
        SettledBranch {
            source: SourceId::new(source),
            outcome,
            elapsed: Duration::from_millis(10),
        }
    }

    fn template() -> DocumentTemplate {
        DocumentTemplate {
            document_type: "ai_newsletter".into(),
            header: NewsletterHeader {
                title: "AI Agents Newsletter".into(),
                headline: "Latest developments".into(),
            },
            labels: HashMap::from([
                (SourceId::new("arxiv"), "Latest Research Papers".to_string()),
                (SourceId::new("web"), "AI Tools & Updates".to_string()),
            ]),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn one_failure_one_success() {
        let joined = JoinedResult::from_entries(vec![
            settled(
                "arxiv",
                RetrievalOutcome::failure(FailureKind::Timeout, "no response within 60000ms"),
            ),
            settled(
                "web",
                RetrievalOutcome::Success(vec![item("web", "N1", "https://news.example/1")]),
            ),
        ]);

        let doc = assemble(&joined, &template(), RunId::new(), at());

        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].label, "Latest Research Papers");
        assert!(doc.sections[0].items.is_empty());
        assert!(matches!(
            doc.sections[0].status,
            SectionStatus::Failed { kind: FailureKind::Timeout, .. }
        ));
        assert_eq!(doc.sections[1].status, SectionStatus::Populated);
        assert_eq!(doc.coverage.failed.len(), 1);
        assert_eq!(doc.coverage.populated, vec![SourceId::new("web")]);
        assert_eq!(
            doc.header.headline,
            "Latest developments (Note: Latest Research Papers search failed, results may be incomplete)"
        );
        assert_eq!(doc.generated_at, at());
    }

    #[test]
    fn headline_names_every_failed_section() {
        let joined = JoinedResult::from_entries(vec![
            settled("arxiv", RetrievalOutcome::failure(FailureKind::TransportError, "reset")),
            settled("web", RetrievalOutcome::Success(vec![])),
            settled("blogs", RetrievalOutcome::failure(FailureKind::InvalidResponse, "not json")),
        ]);

        let doc = assemble(&joined, &template(), RunId::new(), at());

        assert!(
            doc.header
                .headline
                .ends_with("(Note: Latest Research Papers, blogs searches failed, results may be incomplete)")
        );
    }

    #[test]
    fn sections_follow_priority_order() {
        let joined = JoinedResult::from_entries(vec![
            settled("web", RetrievalOutcome::Success(vec![item("web", "N", "https://n.example")])),
            settled("arxiv", RetrievalOutcome::Success(vec![item("arxiv", "P", "https://p.example")])),
        ]);

        let doc = assemble(&joined, &template(), RunId::new(), at());
        let order: Vec<&str> = doc.sections.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(order, vec!["web", "arxiv"]);
    }

    #[test]
    fn dedup_keeps_first_by_priority_then_arrival() {
        let first = item("arxiv", "Agents paper", "https://arxiv.org/abs/2401.1");
        let mut same_within = item("arxiv", "Agents paper (v2)", "http://arxiv.org/abs/2401.1/");
        same_within.summary = "different text".into();
        let across = item("web", "Agents paper, covered", "https://arxiv.org/abs/2401.1");
        let unique = item("web", "Something else", "https://news.example/2");

        let joined = JoinedResult::from_entries(vec![
            settled("arxiv", RetrievalOutcome::Success(vec![first, same_within])),
            settled("web", RetrievalOutcome::Success(vec![across, unique])),
        ]);

        let doc = assemble(&joined, &template(), RunId::new(), at());

        assert_eq!(doc.sections[0].items.len(), 1);
        assert_eq!(doc.sections[0].items[0].title, "Agents paper");
        assert_eq!(doc.sections[1].items.len(), 1);
        assert_eq!(doc.sections[1].items[0].title, "Something else");
        assert_eq!(doc.coverage.duplicates_dropped, 2);
    }

    #[test]
    fn zero_items_and_fully_deduplicated_sections_are_empty() {
        let joined = JoinedResult::from_entries(vec![
            settled("arxiv", RetrievalOutcome::Success(vec![item("arxiv", "P", "https://p.example")])),
            settled("web", RetrievalOutcome::Success(vec![item("web", "P again", "https://p.example/")])),
            settled("extra", RetrievalOutcome::Success(vec![])),
        ]);

        let doc = assemble(&joined, &template(), RunId::new(), at());

        assert_eq!(doc.sections[1].status, SectionStatus::Empty);
        assert_eq!(doc.sections[2].status, SectionStatus::Empty);
        assert_eq!(doc.sections[2].label, "extra");
        assert_eq!(doc.coverage.empty.len(), 2);
        assert!(doc.coverage.failed.is_empty());
        assert_eq!(doc.header.headline, "Latest developments");
    }
}
