//! Core orchestration for Gazette.
//!
//! Fans retrieval out to every configured source, joins the outcomes under a
//! partial-failure policy, assembles a deduplicated [`gazette_shared::NewsletterDocument`],
//! then renders and persists one artifact per output format. The
//! [`Pipeline`] drives the whole run as an explicit state machine.

pub mod assembler;
pub mod branch;
pub mod diagnostics;
pub mod join;
pub mod persist;
pub mod pipeline;
pub mod ports;
pub mod progress;
pub mod state;

#[cfg(test)]
mod test_support;

pub use diagnostics::{DiagnosticsEntry, DiagnosticsReport};
pub use pipeline::{Pipeline, RunFailure, RunReport, SourceBinding, SourceStatus, SourceSummary};
pub use ports::{Clock, FixedClock, RenderPort, RetrievalPort, SystemClock};
pub use progress::{ProgressReporter, SilentProgress};
pub use state::{PipelineState, StateMachineShape};
