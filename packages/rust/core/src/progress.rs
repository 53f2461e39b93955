//! Progress callbacks for reporting pipeline status.

use gazette_shared::{PersistedArtifact, RetrievalOutcome, SourceId};

use crate::pipeline::RunReport;
use crate::state::PipelineState;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the controller enters a new state.
    fn state(&self, state: PipelineState);
    /// Called as each branch outcome is collected at the join point.
    fn branch_settled(&self, source: &SourceId, outcome: &RetrievalOutcome, settled: usize, total: usize);
    /// Called after an artifact is published under its final name.
    fn artifact_written(&self, artifact: &PersistedArtifact);
    /// Called when a run reaches a terminal state.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn state(&self, _state: PipelineState) {}
    fn branch_settled(&self, _source: &SourceId, _outcome: &RetrievalOutcome, _settled: usize, _total: usize) {}
    fn artifact_written(&self, _artifact: &PersistedArtifact) {}
    fn done(&self, _report: &RunReport) {}
}
