//! Pipeline controller: `Idle → Joining → Assembling → Persisting → Done`.
//!
//! Drives one run through the state machine in [`crate::state`]. The joined
//! result and the document live only for the duration of [`Pipeline::run`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use gazette_shared::{
    Coverage, FailureKind, GazetteError, NewsletterHeader, PersistConfig, PersistedArtifact,
    Result, RetrievalOutcome, RetrievalRequest, RunId, SourceId,
};

use crate::assembler::{self, DocumentTemplate};
use crate::branch::SettledBranch;
use crate::join::{self, Branch, JoinError};
use crate::persist::{self, FormatFailure};
use crate::ports::{Clock, RenderPort, RetrievalPort, SystemClock};
use crate::progress::ProgressReporter;
use crate::state::{PipelineState, StateMachineShape, StateTracker};

/// A configured source: the port that serves it and what to ask it.
#[derive(Clone)]
pub struct SourceBinding {
    pub port: Arc<dyn RetrievalPort>,
    /// Request used for normal runs.
    pub request: RetrievalRequest,
    /// Lightweight request used by diagnostics.
    pub probe: RetrievalRequest,
    /// Section heading.
    pub label: String,
}

impl SourceBinding {
    pub fn source(&self) -> &SourceId {
        &self.request.source
    }
}

impl fmt::Debug for SourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceBinding")
            .field("source", &self.request.source)
            .field("port", &self.port.name())
            .field("label", &self.label)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// How a source's branch settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Ok { items: usize },
    Failed { kind: FailureKind, detail: String },
}

/// Per-source summary of a run or diagnostics pass.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source: SourceId,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub elapsed: Duration,
}

impl SourceSummary {
    pub(crate) fn from_settled(settled: &SettledBranch) -> Self {
        let status = match &settled.outcome {
            RetrievalOutcome::Success(items) => SourceStatus::Ok { items: items.len() },
            RetrievalOutcome::Failure { kind, detail } => SourceStatus::Failed {
                kind: *kind,
                detail: detail.clone(),
            },
        };
        Self {
            source: settled.source.clone(),
            status,
            elapsed: settled.elapsed,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, SourceStatus::Ok { .. })
    }
}

/// Why a run ended in [`PipelineState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunFailure {
    AllSourcesFailed,
    Cancelled,
    NoArtifactPersisted,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllSourcesFailed => "all sources failed",
            Self::Cancelled => "run cancelled",
            Self::NoArtifactPersisted => "no artifact persisted",
        })
    }
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub final_state: PipelineState,
    /// Every state visited, starting with `Idle`.
    pub history: Vec<PipelineState>,
    /// Per-source outcomes in priority order.
    pub sources: Vec<SourceSummary>,
    /// Coverage metadata, present once a document was assembled.
    pub coverage: Option<Coverage>,
    pub total_items: usize,
    /// Directory artifacts were (or would have been) written to.
    pub output_root: PathBuf,
    pub artifacts: Vec<PersistedArtifact>,
    pub format_failures: Vec<FormatFailure>,
    pub failure: Option<RunFailure>,
    pub elapsed: Duration,
}

impl RunReport {
    /// `Done` with at least one artifact.
    pub fn is_success(&self) -> bool {
        self.final_state == PipelineState::Done && !self.artifacts.is_empty()
    }

    /// Done, but some source failed or came back empty, or a format was lost.
    pub fn is_partial(&self) -> bool {
        self.is_success()
            && (!self.format_failures.is_empty()
                || self.coverage.as_ref().is_some_and(Coverage::is_partial))
    }

    /// The run's failure as a library error, if it failed.
    pub fn error(&self) -> Option<GazetteError> {
        self.failure.map(|failure| match failure {
            RunFailure::AllSourcesFailed => GazetteError::AllSourcesFailed {
                count: self.sources.len(),
            },
            RunFailure::Cancelled => GazetteError::Cancelled,
            RunFailure::NoArtifactPersisted => GazetteError::persist(
                &self.output_root,
                format!("all {} formats failed", self.format_failures.len()),
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The orchestrator. Cheap to clone; holds no per-run state.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) sources: Vec<SourceBinding>,
    renderer: Arc<dyn RenderPort>,
    persist: PersistConfig,
    header: NewsletterHeader,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    /// Build a pipeline over `sources` (in section priority order).
    ///
    /// Rejects an empty source list and duplicate source ids.
    pub fn new(
        sources: Vec<SourceBinding>,
        renderer: Arc<dyn RenderPort>,
        persist: PersistConfig,
        header: NewsletterHeader,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(GazetteError::validation("pipeline needs at least one source"));
        }
        let mut seen = HashSet::new();
        for binding in &sources {
            if binding.probe.source != binding.request.source {
                return Err(GazetteError::validation(format!(
                    "probe for source '{}' targets '{}'",
                    binding.request.source, binding.probe.source
                )));
            }
            if !seen.insert(binding.source().clone()) {
                return Err(GazetteError::validation(format!(
                    "duplicate source id '{}'",
                    binding.source()
                )));
            }
        }
        if persist.formats.is_empty() {
            return Err(GazetteError::validation("at least one output format is required"));
        }

        Ok(Self {
            sources,
            renderer,
            persist,
            header,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the generation-timestamp clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sources(&self) -> &[SourceBinding] {
        &self.sources
    }

    /// Static state/transition listing. Executes nothing.
    pub fn describe() -> StateMachineShape {
        StateMachineShape::describe()
    }

    fn template(&self) -> DocumentTemplate {
        DocumentTemplate {
            document_type: self.persist.document_type.clone(),
            header: self.header.clone(),
            labels: self
                .sources
                .iter()
                .map(|s| (s.source().clone(), s.label.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    /// Execute one full run. Never returns an error: failures are reported in
    /// the [`RunReport`] with `final_state == Failed`.
    #[instrument(skip_all, fields(sources = self.sources.len()))]
    pub async fn run(&self, cancel: &CancellationToken, progress: &dyn ProgressReporter) -> RunReport {
        let start = Instant::now();
        let run_id = RunId::new();
        let mut tracker = StateTracker::new();

        info!(%run_id, "starting run");

        // --- Joining ---
        enter(&mut tracker, PipelineState::Joining, progress);
        let branches = self
            .sources
            .iter()
            .map(|s| Branch {
                request: s.request.clone(),
                port: Arc::clone(&s.port),
            })
            .collect();

        let joined = match join::join(branches, cancel, progress).await {
            Ok(joined) => joined,
            Err(err) => {
                let failure = match err {
                    JoinError::AllSourcesFailed(_) => RunFailure::AllSourcesFailed,
                    JoinError::Cancelled(_) => RunFailure::Cancelled,
                };
                warn!(%run_id, %failure, "run failed during join");
                enter(&mut tracker, PipelineState::Failed, progress);
                let report = RunReport {
                    run_id,
                    final_state: tracker.current(),
                    history: tracker.history().to_vec(),
                    sources: err.joined().iter().map(SourceSummary::from_settled).collect(),
                    coverage: None,
                    total_items: 0,
                    output_root: self.persist.output_root.clone(),
                    artifacts: Vec::new(),
                    format_failures: Vec::new(),
                    failure: Some(failure),
                    elapsed: start.elapsed(),
                };
                progress.done(&report);
                return report;
            }
        };
        let sources: Vec<SourceSummary> = joined.iter().map(SourceSummary::from_settled).collect();

        // --- Assembling ---
        enter(&mut tracker, PipelineState::Assembling, progress);
        let doc = assembler::assemble(&joined, &self.template(), run_id.clone(), self.clock.now());
        drop(joined);

        // --- Persisting ---
        enter(&mut tracker, PipelineState::Persisting, progress);
        let persisted = persist::render_and_persist(
            &doc,
            self.renderer.as_ref(),
            &self.persist.formats,
            &self.persist.output_root,
            &mut |artifact| progress.artifact_written(artifact),
        );

        let failure = if persisted.artifacts.is_empty() {
            enter(&mut tracker, PipelineState::Failed, progress);
            Some(RunFailure::NoArtifactPersisted)
        } else {
            enter(&mut tracker, PipelineState::Done, progress);
            None
        };

        let report = RunReport {
            run_id,
            final_state: tracker.current(),
            history: tracker.history().to_vec(),
            sources,
            total_items: doc.total_items(),
            coverage: Some(doc.coverage),
            output_root: self.persist.output_root.clone(),
            artifacts: persisted.artifacts,
            format_failures: persisted.failures,
            failure,
            elapsed: start.elapsed(),
        };

        info!(
            run_id = %report.run_id,
            state = %report.final_state,
            artifacts = report.artifacts.len(),
            items = report.total_items,
            elapsed_ms = report.elapsed.as_millis(),
            "run finished"
        );
        progress.done(&report);
        report
    }
}

fn enter(tracker: &mut StateTracker, to: PipelineState, progress: &dyn ProgressReporter) {
    match tracker.advance(to) {
        Ok(state) => progress.state(state),
        Err(e) => error!(error = %e, "state machine violation"),
    }
}
