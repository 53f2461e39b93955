//! Join coordinator: fan out one branch per source, wait for all to settle.
//!
//! Branches run as independent tokio tasks. Each task owns its outcome slot
//! (its join handle); the coordinator reads the slots only after the tasks
//! finish, so no locking is involved. Worst-case latency is the largest
//! branch deadline, not the sum.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, instrument, warn};

use gazette_shared::{FailureKind, GazetteError, RetrievalOutcome, RetrievalRequest, SourceId};

use crate::branch::{self, SettledBranch};
use crate::ports::RetrievalPort;
use crate::progress::ProgressReporter;

/// One retrieval request bound to the port that serves it.
#[derive(Clone)]
pub struct Branch {
    pub request: RetrievalRequest,
    pub port: Arc<dyn RetrievalPort>,
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch")
            .field("request", &self.request)
            .field("port", &self.port.name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// JoinedResult
// ---------------------------------------------------------------------------

/// Outcome of every configured source, in priority (request) order.
///
/// Holds exactly one entry per requested source.
#[derive(Debug, Clone)]
pub struct JoinedResult {
    entries: Vec<SettledBranch>,
}

impl JoinedResult {
    /// Build a joined result directly (entries are kept in the given order).
    pub fn from_entries(entries: Vec<SettledBranch>) -> Self {
        Self { entries }
    }

    /// Entries in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &SettledBranch> {
        self.entries.iter()
    }

    pub fn get(&self, source: &SourceId) -> Option<&RetrievalOutcome> {
        self.entries
            .iter()
            .find(|e| &e.source == source)
            .map(|e| &e.outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.len() - self.success_count()
    }

    /// True when no branch succeeded.
    pub fn all_failed(&self) -> bool {
        self.success_count() == 0
    }
}

/// Why a join did not yield a usable result.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// Every branch failed; nothing to assemble.
    #[error("all {} sources failed", .0.len())]
    AllSourcesFailed(JoinedResult),

    /// The run was cancelled; unsettled branches were recorded as timeouts.
    #[error("join cancelled")]
    Cancelled(JoinedResult),
}

impl JoinError {
    /// The (partial) per-source outcomes collected before giving up.
    pub fn joined(&self) -> &JoinedResult {
        match self {
            Self::AllSourcesFailed(j) | Self::Cancelled(j) => j,
        }
    }
}

impl From<JoinError> for GazetteError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::AllSourcesFailed(j) => GazetteError::AllSourcesFailed { count: j.len() },
            JoinError::Cancelled(_) => GazetteError::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Fan-out / join
// ---------------------------------------------------------------------------

/// Launch every branch concurrently and wait until all have settled.
///
/// Applies the partial-failure policy: one success (even with zero items) is
/// enough; if every branch fails the join fails with
/// [`JoinError::AllSourcesFailed`].
#[instrument(skip_all, fields(branches = branches.len()))]
pub async fn join(
    branches: Vec<Branch>,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<JoinedResult, JoinError> {
    let (joined, cancelled) = settle_all(branches, cancel, progress).await;

    if cancelled {
        warn!(settled = joined.success_count(), "join cancelled");
        return Err(JoinError::Cancelled(joined));
    }

    if joined.all_failed() {
        warn!(sources = joined.len(), "all sources failed");
        return Err(JoinError::AllSourcesFailed(joined));
    }

    info!(
        sources = joined.len(),
        succeeded = joined.success_count(),
        failed = joined.failure_count(),
        "join complete"
    );
    Ok(joined)
}

/// Fan out and collect every outcome without applying any failure policy.
///
/// Returns the collected result and whether `cancel` fired before all
/// branches settled. On cancellation, branches still running are aborted and
/// recorded as `Failure(Timeout)`.
pub(crate) async fn settle_all(
    branches: Vec<Branch>,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> (JoinedResult, bool) {
    let start = Instant::now();
    let total = branches.len();

    let mut pending: VecDeque<(SourceId, JoinHandle<SettledBranch>)> = branches
        .into_iter()
        .map(|branch| {
            let source = branch.request.source.clone();
            let span = info_span!("branch", source = %source);
            let handle = tokio::spawn(
                async move { branch::run(branch.port.as_ref(), &branch.request).await }
                    .instrument(span),
            );
            (source, handle)
        })
        .collect();

    let mut entries = Vec::with_capacity(total);
    let mut cancelled = false;

    while let Some((source, mut handle)) = pending.pop_front() {
        let res = tokio::select! {
            biased;
            res = &mut handle => Some(res),
            _ = cancel.cancelled() => None,
        };
        let Some(res) = res else {
            cancelled = true;
            pending.push_front((source, handle));
            break;
        };
        let settled = from_task_result(source, res, start.elapsed());
        progress.branch_settled(&settled.source, &settled.outcome, entries.len() + 1, total);
        entries.push(settled);
    }

    if cancelled {
        for (source, handle) in pending.drain(..) {
            let settled = if handle.is_finished() {
                from_task_result(source, handle.await, start.elapsed())
            } else {
                handle.abort();
                SettledBranch::abandoned(source, start.elapsed())
            };
            progress.branch_settled(&settled.source, &settled.outcome, entries.len() + 1, total);
            entries.push(settled);
        }
    }

    (JoinedResult::from_entries(entries), cancelled)
}

/// A panicking or aborted branch task still yields exactly one outcome.
fn from_task_result(
    source: SourceId,
    res: Result<SettledBranch, tokio::task::JoinError>,
    elapsed: Duration,
) -> SettledBranch {
    match res {
        Ok(settled) => settled,
        Err(e) => {
            warn!(%source, error = %e, "branch task did not complete");
            SettledBranch {
                source,
                outcome: RetrievalOutcome::failure(
                    FailureKind::TransportError,
                    format!("branch task failed: {e}"),
                ),
                elapsed,
            }
        }
    }
}
