//! Render & persist stage.
//!
//! Renders the document once per requested format and publishes each payload
//! atomically: the bytes go to a hidden temp file in the output directory,
//! which is published under the final name only after the full write. A failure in
//! one format never prevents the others from being attempted.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use gazette_shared::{FormatTag, GazetteError, NewsletterDocument, PersistedArtifact, Result};

use crate::ports::RenderPort;

/// Stage at which a format was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Render,
    Persist,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Render => "render",
            Self::Persist => "persist",
        })
    }
}

/// A format that did not produce an artifact.
#[derive(Debug)]
pub struct FormatFailure {
    pub format: FormatTag,
    pub stage: FailureStage,
    pub error: GazetteError,
}

/// Outcome of the render & persist stage.
#[derive(Debug, Default)]
pub struct PersistReport {
    pub artifacts: Vec<PersistedArtifact>,
    pub failures: Vec<FormatFailure>,
}

/// Destination file name for an artifact.
///
/// Pure function of document type, generation timestamp and format:
/// `{document_type}_{YYYYMMDD_HHMMSS}.{ext}`.
pub fn artifact_file_name(document_type: &str, generated_at: DateTime<Utc>, format: FormatTag) -> String {
    format!(
        "{document_type}_{}.{}",
        generated_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Render `doc` in every format and write each artifact under `output_root`.
///
/// Duplicate formats are rendered once.
#[instrument(skip_all, fields(run_id = %doc.run_id, root = %output_root.display(), formats = formats.len()))]
pub fn render_and_persist(
    doc: &NewsletterDocument,
    renderer: &dyn RenderPort,
    formats: &[FormatTag],
    output_root: &Path,
    on_written: &mut dyn FnMut(&PersistedArtifact),
) -> PersistReport {
    let mut report = PersistReport::default();

    let mut unique: Vec<FormatTag> = Vec::with_capacity(formats.len());
    for format in formats {
        if !unique.contains(format) {
            unique.push(*format);
        }
    }

    if let Err(e) = std::fs::create_dir_all(output_root) {
        warn!(error = %e, "cannot create output directory");
        let message = e.to_string();
        for format in unique {
            report.failures.push(FormatFailure {
                format,
                stage: FailureStage::Persist,
                error: GazetteError::persist(output_root, message.clone()),
            });
        }
        return report;
    }

    for format in unique {
        let payload = match renderer.render(doc, format) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%format, %error, "render failed");
                report.failures.push(FormatFailure {
                    format,
                    stage: FailureStage::Render,
                    error,
                });
                continue;
            }
        };

        let target = output_root.join(artifact_file_name(&doc.document_type, doc.generated_at, format));
        match publish(&target, &payload) {
            Ok(()) => {
                let artifact = PersistedArtifact {
                    format,
                    sha256: sha256_hex(&payload),
                    payload,
                    path: target,
                };
                debug!(%format, path = %artifact.path.display(), size = artifact.size_bytes(), "wrote artifact");
                on_written(&artifact);
                report.artifacts.push(artifact);
            }
            Err(error) => {
                warn!(%format, %error, "persist failed");
                report.failures.push(FormatFailure {
                    format,
                    stage: FailureStage::Persist,
                    error,
                });
            }
        }
    }

    info!(
        written = report.artifacts.len(),
        failed = report.failures.len(),
        "render and persist complete"
    );
    report
}

/// Stage `payload` in a hidden temp file next to `target`, then publish it.
///
/// Never replaces an existing file. The temp file is removed on any failure.
fn publish(target: &Path, payload: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::now_v7()));

    let result = stage(&temp, payload).and_then(|()| {
        link_no_clobber(&temp, target).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                GazetteError::persist(target, "artifact already exists (name collision)")
            } else {
                GazetteError::io(target, e)
            }
        })
    });

    let _ = std::fs::remove_file(&temp);
    result
}

/// Publish `temp` as `target`, failing with `AlreadyExists` rather than
/// replacing an existing file.
fn link_no_clobber(temp: &Path, target: &Path) -> std::io::Result<()> {
    match std::fs::hard_link(temp, target) {
        // FAT/exFAT and some network mounts have no hard links
        Err(e) if matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::PermissionDenied) => {
            debug!(path = %target.display(), error = %e, "hard link unavailable, publishing by rename");
            claim_and_rename(temp, target)
        }
        other => other,
    }
}

/// Reserve `target` with an empty placeholder, then rename `temp` over it.
///
/// Readers may briefly see the empty placeholder before the rename lands.
fn claim_and_rename(temp: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)?;
    std::fs::rename(temp, target).inspect_err(|_| {
        let _ = std::fs::remove_file(target);
    })
}

fn stage(temp: &Path, payload: &[u8]) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp)
        .map_err(|e| GazetteError::io(temp, e))?;
    file.write_all(payload).map_err(|e| GazetteError::io(temp, e))?;
    file.sync_all().map_err(|e| GazetteError::io(temp, e))?;
    Ok(())
}

fn sha256_hex(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use gazette_shared::{Coverage, NewsletterHeader, RunId};

    use super::*;
    use crate::test_support::{MockRenderer, temp_dir};

    fn doc_at(at: DateTime<Utc>) -> NewsletterDocument {
        NewsletterDocument {
            run_id: RunId::new(),
            document_type: "ai_newsletter".into(),
            generated_at: at,
            header: NewsletterHeader {
                title: "Weekly".into(),
                headline: "News".into(),
            },
            sections: vec![],
            coverage: Coverage::default(),
        }
    }

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, sec).unwrap()
    }

    fn leftover_temps(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn file_name_is_deterministic() {
        assert_eq!(
            artifact_file_name("ai_newsletter", at(53), FormatTag::Html),
            "ai_newsletter_20260314_092653.html"
        );
        assert_eq!(
            artifact_file_name("ai_newsletter", at(53), FormatTag::Text),
            "ai_newsletter_20260314_092653.txt"
        );
        assert_ne!(
            artifact_file_name("ai_newsletter", at(53), FormatTag::Html),
            artifact_file_name("ai_newsletter", at(54), FormatTag::Html)
        );
    }

    #[test]
    fn writes_every_format_atomically() {
        let tmp = temp_dir("persist-all");
        let renderer = MockRenderer::new();
        let mut written = Vec::new();

        let report = render_and_persist(
            &doc_at(at(1)),
            &renderer,
            &[FormatTag::Html, FormatTag::Text, FormatTag::Html],
            &tmp,
            &mut |a| written.push(a.format),
        );

        assert!(report.failures.is_empty());
        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(written, vec![FormatTag::Html, FormatTag::Text]);
        assert_eq!(renderer.calls().load(std::sync::atomic::Ordering::SeqCst), 2);

        let html = &report.artifacts[0];
        assert_eq!(std::fs::read(&html.path).unwrap(), html.payload);
        assert_eq!(html.sha256.len(), 64);
        assert_eq!(leftover_temps(&tmp), 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn render_failure_is_isolated() {
        let tmp = temp_dir("persist-isolated");
        let renderer = MockRenderer::failing(&[FormatTag::Html]);

        let report = render_and_persist(
            &doc_at(at(2)),
            &renderer,
            &[FormatTag::Html, FormatTag::Text],
            &tmp,
            &mut |_| {},
        );

        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.artifacts[0].format, FormatTag::Text);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].format, FormatTag::Html);
        assert_eq!(report.failures[0].stage, FailureStage::Render);
        assert!(!tmp.join("ai_newsletter_20260314_092602.html").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn same_instant_collides_without_overwriting() {
        let tmp = temp_dir("persist-collision");
        let renderer = MockRenderer::new();
        let doc = doc_at(at(3));

        let first = render_and_persist(&doc, &renderer, &[FormatTag::Text], &tmp, &mut |_| {});
        assert_eq!(first.artifacts.len(), 1);
        let original = std::fs::read(&first.artifacts[0].path).unwrap();

        let mut retitled = doc.clone();
        retitled.header.title = "Different".into();
        let second = render_and_persist(&retitled, &renderer, &[FormatTag::Text], &tmp, &mut |_| {});

        assert!(second.artifacts.is_empty());
        assert_eq!(second.failures.len(), 1);
        assert_eq!(second.failures[0].stage, FailureStage::Persist);
        assert!(second.failures[0].error.to_string().contains("collision"));
        assert_eq!(std::fs::read(&first.artifacts[0].path).unwrap(), original);
        assert_eq!(leftover_temps(&tmp), 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rename_fallback_never_clobbers() {
        let tmp = temp_dir("persist-rename");
        let target = tmp.join("ai_newsletter_20260314_092605.txt");

        let staged = tmp.join(".first.tmp");
        std::fs::write(&staged, b"first").unwrap();
        claim_and_rename(&staged, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"first");
        assert!(!staged.exists());

        let staged = tmp.join(".second.tmp");
        std::fs::write(&staged, b"second").unwrap();
        let err = claim_and_rename(&staged, &target).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&target).unwrap(), b"first");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn unwritable_root_fails_every_format() {
        let tmp = temp_dir("persist-unwritable");
        let blocker = tmp.join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let report = render_and_persist(
            &doc_at(at(4)),
            &MockRenderer::new(),
            &[FormatTag::Html, FormatTag::Json],
            &blocker.join("out"),
            &mut |_| {},
        );

        assert!(report.artifacts.is_empty());
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.stage == FailureStage::Persist));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
