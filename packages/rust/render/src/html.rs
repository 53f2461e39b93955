//! Self-contained HTML layout.

use std::fmt::Write;

use gazette_shared::{NewsletterDocument, RetrievedItem, Section, SectionStatus};
use url::Url;

use crate::{
    TemplateRenderer, category_badge, item_date, link_label, long_date, section_icon,
};

const STYLE: &str = r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; background: #f8f9fa; }
    .container { max-width: 800px; margin: 0 auto; background: #fff; }
    .header { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: #fff; padding: 2rem; text-align: center; }
    .header h1 { font-size: 2.4rem; margin-bottom: 0.5rem; }
    .header .subtitle { font-size: 1.1rem; opacity: 0.9; margin-bottom: 1rem; }
    .header .date { font-size: 0.9rem; opacity: 0.8; }
    .content { padding: 2rem; }
    .stats { background: #2c3e50; color: #fff; padding: 1.5rem; border-radius: 8px; margin-bottom: 2rem; text-align: center; }
    .stats-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 1rem; margin-top: 1rem; }
    .stat-number { font-size: 2rem; font-weight: 700; display: block; }
    .section { margin-bottom: 3rem; }
    .section-title { font-size: 1.8rem; color: #2c3e50; margin-bottom: 1.5rem; border-bottom: 3px solid #667eea; }
    .section-note { color: #6c757d; font-style: italic; }
    .section-note.failed { color: #c0392b; }
    .item { background: #f8f9fa; border-left: 4px solid #667eea; padding: 1.5rem; margin-bottom: 1.5rem; }
    .item-title { font-size: 1.3rem; font-weight: 600; color: #2c3e50; margin-bottom: 0.8rem; }
    .item-meta { display: flex; gap: 1rem; margin-bottom: 1rem; flex-wrap: wrap; }
    .meta-item { background: #e9ecef; padding: 0.3rem 0.8rem; border-radius: 20px; font-size: 0.85rem; }
    .category { background: #667eea; color: #fff; }
    .item-findings { background: #e8f4f8; padding: 1rem; border-radius: 6px; margin-bottom: 1rem; }
    .item-link { color: #667eea; text-decoration: none; font-weight: 500; }
    .footer { background: #2c3e50; color: #fff; padding: 2rem; text-align: center; }
"#;

pub(crate) fn render(renderer: &TemplateRenderer, doc: &NewsletterDocument) -> String {
    let title = escape(&doc.header.title);
    let date = long_date(doc.generated_at);
    let mut out = String::with_capacity(8 * 1024);

    let _ = write!(
        out,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<div class="container">
<div class="header">
<h1>{title}</h1>
<div class="subtitle">{headline}</div>
<div class="date">{date}</div>
</div>
<div class="content">
"#,
        headline = escape(&doc.header.headline),
    );

    write_stats(&mut out, doc);
    for section in &doc.sections {
        write_section(&mut out, section);
    }

    let _ = write!(
        out,
        r#"</div>
<div class="footer">
<p><strong>{title}</strong></p>
<p>Generated on {date}</p>
<p>{tagline}</p>
</div>
</div>
</body>
</html>
"#,
        tagline = escape(renderer.tagline()),
    );
    out
}

fn write_stats(out: &mut String, doc: &NewsletterDocument) {
    out.push_str("<div class=\"stats\">\n<h3>Newsletter Summary</h3>\n<div class=\"stats-grid\">\n");
    for section in &doc.sections {
        stat(out, section.items.len(), &section.label);
    }
    stat(out, doc.total_items(), "Total Items");
    out.push_str("</div>\n</div>\n");
}

fn stat(out: &mut String, count: usize, label: &str) {
    let _ = writeln!(
        out,
        r#"<div class="stat-item"><span class="stat-number">{count}</span><span class="stat-label">{}</span></div>"#,
        escape(label)
    );
}

fn write_section(out: &mut String, section: &Section) {
    let _ = writeln!(
        out,
        r#"<div class="section">
<h2 class="section-title">{} {}</h2>"#,
        section_icon(section),
        escape(&section.label)
    );

    match &section.status {
        SectionStatus::Failed { kind, detail } => {
            let _ = writeln!(
                out,
                r#"<p class="section-note failed">This source was unavailable for this issue ({kind}: {}).</p>"#,
                escape(detail)
            );
        }
        SectionStatus::Empty => {
            out.push_str("<p class=\"section-note\">No new items this issue.</p>\n");
        }
        SectionStatus::Populated => {
            for item in &section.items {
                write_item(out, item);
            }
        }
    }
    out.push_str("</div>\n");
}

fn write_item(out: &mut String, item: &RetrievedItem) {
    let _ = writeln!(
        out,
        r#"<div class="item">
<div class="item-title">{}</div>
<div class="item-meta">"#,
        escape(&item.title)
    );
    if let Some(badge) = category_badge(item) {
        let _ = writeln!(out, r#"<span class="meta-item category">{}</span>"#, escape(&badge));
    }
    let _ = writeln!(out, r#"<span class="meta-item">📅 {}</span>"#, item_date(item));
    out.push_str("</div>\n");

    if !item.summary.is_empty() {
        let _ = writeln!(out, r#"<div class="item-summary">{}</div>"#, escape(&item.summary));
    }
    if let Some(findings) = item.findings.as_deref().filter(|f| !f.is_empty()) {
        let _ = writeln!(
            out,
            r#"<div class="item-findings"><div class="findings-label">Key Findings:</div>{}</div>"#,
            escape(findings)
        );
    }
    if let Some(href) = web_link(&item.source_url) {
        let _ = writeln!(
            out,
            r#"<a href="{}" class="item-link" target="_blank" rel="noopener">{}</a>"#,
            escape(href.as_str()),
            link_label(item)
        );
    }
    out.push_str("</div>\n");
}

/// Only `http` and `https` URLs become links.
fn web_link(raw: &str) -> Option<Url> {
    Url::parse(raw.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// Escape text for use in element content and double-quoted attributes.
pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
