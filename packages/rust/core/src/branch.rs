//! Branch runner: one retrieval call under a deadline.
//!
//! Every fault a source can produce (error, timeout) comes back as a
//! [`RetrievalOutcome::Failure`]; nothing escapes to the caller.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use gazette_shared::{
    FailureKind, RetrievalOutcome, RetrievalRequest, RetrievedItem, SourceError, SourceId,
    provenance_token,
};

use crate::ports::RetrievalPort;

/// A branch outcome together with how long the branch took to settle.
#[derive(Debug, Clone)]
pub struct SettledBranch {
    pub source: SourceId,
    pub outcome: RetrievalOutcome,
    pub elapsed: Duration,
}

impl SettledBranch {
    /// A branch abandoned before it settled (run cancelled).
    pub(crate) fn abandoned(source: SourceId, elapsed: Duration) -> Self {
        Self {
            source,
            outcome: RetrievalOutcome::failure(
                FailureKind::Timeout,
                "abandoned before settling (run cancelled)",
            ),
            elapsed,
        }
    }
}

/// Run one retrieval request against `port`, enforcing `request.deadline`.
///
/// Does not retry. Invalid items (blank title or URL) are dropped here so the
/// assembler only ever sees well-formed items.
pub async fn run(port: &dyn RetrievalPort, request: &RetrievalRequest) -> SettledBranch {
    let start = Instant::now();
    debug!(source = %request.source, adapter = port.name(), deadline_ms = request.deadline.as_millis(), "branch started");

    let outcome = match tokio::time::timeout(request.deadline, port.run(&request.query)).await {
        Err(_) => RetrievalOutcome::failure(
            FailureKind::Timeout,
            format!("no response within {}ms", request.deadline.as_millis()),
        ),
        Ok(Err(SourceError::Transport(detail))) => {
            RetrievalOutcome::failure(FailureKind::TransportError, detail)
        }
        Ok(Err(SourceError::InvalidResponse(detail))) => {
            RetrievalOutcome::failure(FailureKind::InvalidResponse, detail)
        }
        Ok(Ok(items)) => RetrievalOutcome::Success(sanitize(&request.source, items)),
    };

    let elapsed = start.elapsed();
    match &outcome {
        RetrievalOutcome::Success(items) => info!(
            source = %request.source,
            items = items.len(),
            elapsed_ms = elapsed.as_millis(),
            "branch succeeded"
        ),
        RetrievalOutcome::Failure { kind, detail } => warn!(
            source = %request.source,
            %kind,
            %detail,
            elapsed_ms = elapsed.as_millis(),
            "branch failed"
        ),
    }

    SettledBranch {
        source: request.source.clone(),
        outcome,
        elapsed,
    }
}

/// Drop invalid items, stamp the origin, and fill in missing provenance tokens.
fn sanitize(source: &SourceId, items: Vec<RetrievedItem>) -> Vec<RetrievedItem> {
    let total = items.len();
    let kept: Vec<RetrievedItem> = items
        .into_iter()
        .filter(|item| {
            let valid = item.is_valid();
            if !valid {
                warn!(%source, title = %item.title, url = %item.source_url, "dropping invalid item");
            }
            valid
        })
        .map(|mut item| {
            if &item.origin != source {
                item.origin = source.clone();
            }
            if item.provenance.trim().is_empty() {
                item.provenance = provenance_token(&item.source_url, &item.title);
            }
            item
        })
        .collect();

    if kept.len() < total {
        debug!(%source, dropped = total - kept.len(), "invalid items removed");
    }
    kept
}
