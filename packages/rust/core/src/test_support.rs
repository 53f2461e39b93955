//! Mock ports and fixtures shared by the unit tests of this crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use gazette_shared::{
    FormatTag, GazetteError, NewsletterDocument, Result, RetrievalQuery, RetrievalRequest,
    RetrievedItem, SourceError, SourceId,
};

use crate::join::Branch;
use crate::ports::{RenderPort, RetrievalPort};

pub(crate) fn item(source: &str, title: &str, url: &str) -> RetrievedItem {
    RetrievedItem::new(SourceId::new(source), title, url).with_summary(format!("About {title}"))
}

pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub(crate) fn request(source: &str, deadline: Duration) -> RetrievalRequest {
    RetrievalRequest {
        source: SourceId::new(source),
        query: RetrievalQuery::new("agents"),
        deadline,
    }
}

pub(crate) fn branch(source: &str, deadline: Duration, port: impl RetrievalPort + 'static) -> Branch {
    Branch {
        request: request(source, deadline),
        port: Arc::new(port),
    }
}

/// Returns a fixed result after an optional delay, counting calls.
pub(crate) struct MockSource {
    result: std::result::Result<Vec<RetrievedItem>, SourceError>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockSource {
    pub(crate) fn items(items: Vec<RetrievedItem>) -> Self {
        Self {
            result: Ok(items),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn failing(err: SourceError) -> Self {
        Self {
            result: Err(err),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl RetrievalPort for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, _query: &RetrievalQuery) -> std::result::Result<Vec<RetrievedItem>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

/// Panics inside the branch task.
pub(crate) struct PanickingSource;

#[async_trait]
impl RetrievalPort for PanickingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn run(&self, _query: &RetrievalQuery) -> std::result::Result<Vec<RetrievedItem>, SourceError> {
        panic!("source exploded");
    }
}

/// Renders a one-line summary; fails for the listed formats. Counts calls.
pub(crate) struct MockRenderer {
    failing: Vec<FormatTag>,
    calls: Arc<AtomicUsize>,
}

impl MockRenderer {
    pub(crate) fn new() -> Self {
        Self::failing(&[])
    }

    pub(crate) fn failing(formats: &[FormatTag]) -> Self {
        Self {
            failing: formats.to_vec(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl RenderPort for MockRenderer {
    fn render(&self, doc: &NewsletterDocument, format: FormatTag) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&format) {
            return Err(GazetteError::render(format, "template failure"));
        }
        Ok(format!("{format}: {} ({} items)", doc.header.title, doc.total_items()).into_bytes())
    }
}
