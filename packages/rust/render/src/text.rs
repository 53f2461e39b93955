//! Plain-text layout for email bodies and terminals.

use std::fmt::Write;

use gazette_shared::{NewsletterDocument, SectionStatus};

use crate::{TemplateRenderer, category_badge, is_paper, item_date, long_date, section_icon};

const RULE_WIDTH: usize = 60;
const SECTION_RULE_WIDTH: usize = 40;

pub(crate) fn render(renderer: &TemplateRenderer, doc: &NewsletterDocument) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let date = long_date(doc.generated_at);
    let mut out = String::with_capacity(4 * 1024);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{}", doc.header.title.to_uppercase());
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{}", doc.header.headline);
    let _ = writeln!(out);
    let _ = writeln!(out, "Date: {date}");
    let _ = writeln!(out, "Total Items: {}", doc.total_items());
    for section in &doc.sections {
        let _ = writeln!(out, "{}: {}", section.label, section.items.len());
    }
    let _ = writeln!(out, "{rule}");

    for section in &doc.sections {
        let _ = writeln!(
            out,
            "\n{} {} ({})",
            section_icon(section),
            section.label.to_uppercase(),
            section.items.len()
        );
        let _ = writeln!(out, "{}\n", "-".repeat(SECTION_RULE_WIDTH));

        match &section.status {
            SectionStatus::Failed { kind, detail } => {
                let _ = writeln!(out, "   [unavailable: {kind}: {detail}]\n");
            }
            SectionStatus::Empty => {
                let _ = writeln!(out, "   [no new items this issue]\n");
            }
            SectionStatus::Populated => {
                for (i, item) in section.items.iter().enumerate() {
                    let _ = writeln!(out, "{}. {}", i + 1, item.title);
                    if !is_paper(item) {
                        if let Some(badge) = category_badge(item) {
                            let _ = writeln!(out, "   Category: {badge}");
                        }
                    }
                    let _ = writeln!(out, "   Date: {}", item_date(item));
                    if !item.summary.is_empty() {
                        let _ = writeln!(out, "   Summary: {}", item.summary);
                    }
                    if let Some(findings) = item.findings.as_deref().filter(|f| !f.is_empty()) {
                        let _ = writeln!(out, "   Key Findings: {findings}");
                    }
                    let _ = writeln!(out, "   Link: {}\n", item.source_url);
                }
            }
        }
    }

    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "{}", doc.header.title);
    let _ = writeln!(out, "Generated on {date}");
    let _ = writeln!(out, "{}", renderer.tagline());
    let _ = writeln!(out, "{rule}");
    out
}
