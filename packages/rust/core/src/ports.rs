//! Capabilities the orchestrator consumes but does not implement.
//!
//! - [`RetrievalPort`]: a research source (literature search, web search, ...)
//! - [`RenderPort`]: turns a [`NewsletterDocument`] into bytes for one format
//! - [`Clock`]: source of generation timestamps (mockable for naming tests)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gazette_shared::{
    FormatTag, NewsletterDocument, Result, RetrievalQuery, RetrievedItem, SourceError,
};

/// A research source the pipeline can fan out to.
///
/// Implementations must not enforce the run deadline themselves: the branch
/// runner abandons the future when the deadline elapses. Retries, if any,
/// belong inside the implementation.
#[async_trait]
pub trait RetrievalPort: Send + Sync {
    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;

    /// Run the query and return items in source order.
    async fn run(&self, query: &RetrievalQuery) -> std::result::Result<Vec<RetrievedItem>, SourceError>;
}

/// Renders a document for one output format. Must be a pure function of its input.
pub trait RenderPort: Send + Sync {
    fn render(&self, doc: &NewsletterDocument, format: FormatTag) -> Result<Vec<u8>>;
}

/// Time source for document generation timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
