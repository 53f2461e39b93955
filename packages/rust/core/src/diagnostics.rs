//! Diagnostics: probe every configured source without assembling or persisting.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::join::{self, Branch};
use crate::pipeline::{Pipeline, SourceSummary};
use crate::progress::ProgressReporter;

/// One probed source.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsEntry {
    pub label: String,
    #[serde(flatten)]
    pub summary: SourceSummary,
}

/// Result of a diagnostics pass, in source priority order.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub entries: Vec<DiagnosticsEntry>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl DiagnosticsReport {
    /// Every source answered and the pass was not cancelled.
    pub fn healthy(&self) -> bool {
        !self.cancelled && self.entries.iter().all(|e| e.summary.is_ok())
    }

    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.summary.is_ok()).count()
    }
}

impl Pipeline {
    /// Run each source's probe request concurrently and report per-source health.
    ///
    /// `deadline` caps every probe; a probe's own deadline applies when shorter.
    #[instrument(skip_all, fields(sources = self.sources.len()))]
    pub async fn diagnose(
        &self,
        deadline: Duration,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> DiagnosticsReport {
        let start = Instant::now();

        let branches = self
            .sources
            .iter()
            .map(|s| {
                let mut request = s.probe.clone();
                request.deadline = request.deadline.min(deadline);
                Branch {
                    request,
                    port: s.port.clone(),
                }
            })
            .collect();

        let (joined, cancelled) = join::settle_all(branches, cancel, progress).await;

        let entries: Vec<DiagnosticsEntry> = joined
            .iter()
            .zip(&self.sources)
            .map(|(settled, binding)| DiagnosticsEntry {
                label: binding.label.clone(),
                summary: SourceSummary::from_settled(settled),
            })
            .collect();

        let report = DiagnosticsReport {
            entries,
            cancelled,
            elapsed: start.elapsed(),
        };
        info!(
            healthy = report.healthy(),
            failed = report.failed_count(),
            elapsed_ms = report.elapsed.as_millis(),
            "diagnostics complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use gazette_shared::{FailureKind, FormatTag, NewsletterHeader, PersistConfig, SourceError};

    use super::*;
    use crate::pipeline::{SourceBinding, SourceStatus};
    use crate::progress::SilentProgress;
    use crate::test_support::{MockRenderer, MockSource, item, request, temp_dir};

    fn pipeline(sources: Vec<(&str, MockSource)>, renderer: MockRenderer) -> (Pipeline, std::path::PathBuf) {
        let tmp = temp_dir("diagnostics");
        let bindings = sources
            .into_iter()
            .map(|(id, port)| SourceBinding {
                port: Arc::new(port),
                request: request(id, Duration::from_secs(60)),
                probe: request(id, Duration::from_secs(60)),
                label: id.to_uppercase(),
            })
            .collect();
        let pipeline = Pipeline::new(
            bindings,
            Arc::new(renderer),
            PersistConfig {
                output_root: tmp.clone(),
                document_type: "ai_newsletter".into(),
                formats: vec![FormatTag::Html],
            },
            NewsletterHeader {
                title: "T".into(),
                headline: "H".into(),
            },
        )
        .unwrap();
        (pipeline, tmp)
    }

    #[tokio::test]
    async fn reports_each_source_without_persisting() {
        let renderer = MockRenderer::new();
        let render_calls = renderer.calls();
        let (pipeline, tmp) = pipeline(
            vec![
                ("arxiv", MockSource::failing(SourceError::Transport("503".into()))),
                ("web", MockSource::items(vec![item("web", "N", "https://n.example")])),
            ],
            renderer,
        );

        let report = pipeline
            .diagnose(Duration::from_secs(5), &CancellationToken::new(), &SilentProgress)
            .await;

        assert!(!report.healthy());
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.entries[0].label, "ARXIV");
        assert!(matches!(
            report.entries[0].summary.status,
            SourceStatus::Failed { kind: FailureKind::TransportError, .. }
        ));
        assert_eq!(report.entries[1].summary.status, SourceStatus::Ok { items: 1 });
        assert_eq!(render_calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(&tmp).unwrap().count(), 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn diagnostics_deadline_caps_probes() {
        let (pipeline, tmp) = pipeline(
            vec![(
                "slow",
                MockSource::items(vec![]).with_delay(Duration::from_secs(10)),
            )],
            MockRenderer::new(),
        );

        let start = Instant::now();
        let report = pipeline
            .diagnose(Duration::from_millis(50), &CancellationToken::new(), &SilentProgress)
            .await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            report.entries[0].summary.status,
            SourceStatus::Failed { kind: FailureKind::Timeout, .. }
        ));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn all_failing_probes_still_report() {
        let (pipeline, tmp) = pipeline(
            vec![("a", MockSource::failing(SourceError::InvalidResponse("bad".into())))],
            MockRenderer::new(),
        );

        let report = pipeline
            .diagnose(Duration::from_secs(1), &CancellationToken::new(), &SilentProgress)
            .await;

        assert_eq!(report.entries.len(), 1);
        assert!(!report.healthy());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["status"], "failed");
        assert_eq!(json["entries"][0]["kind"], "invalid_response");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
