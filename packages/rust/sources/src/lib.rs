//! Retrieval port adapters for Gazette.
//!
//! - [`ArxivSource`]: arXiv Atom export API (research papers)
//! - [`TavilySource`]: Tavily web search (tools, frameworks, news)
//!
//! [`bind_sources`] turns the `[[sources]]` config table into the
//! [`SourceBinding`]s the pipeline runs.

pub mod arxiv;
pub mod tavily;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use gazette_core::{RetrievalPort, SourceBinding};
use gazette_shared::{AppConfig, GazetteError, Result, SourceConfig, SourceKind, resolve_api_key};

pub use arxiv::ArxivSource;
pub use tavily::TavilySource;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("Gazette/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client shared by every adapter.
///
/// No overall request timeout is set: the branch runner enforces each
/// source's deadline.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| GazetteError::Network(format!("failed to build HTTP client: {e}")))
}

/// Build the adapter for one configured source.
pub fn build_port(source: &SourceConfig, client: Client) -> Result<Arc<dyn RetrievalPort>> {
    let id = source.source_id();
    let port: Arc<dyn RetrievalPort> = match source.kind {
        SourceKind::Arxiv => Arc::new(match &source.endpoint {
            Some(endpoint) => ArxivSource::with_endpoint(client, id, endpoint.clone()),
            None => ArxivSource::new(client, id),
        }),
        SourceKind::Tavily => {
            if source.api_key_env.is_none() {
                return Err(GazetteError::config(format!(
                    "source '{}' uses tavily but sets no api_key_env",
                    source.id
                )));
            }
            let api_key = resolve_api_key(source)?.unwrap_or_default();
            Arc::new(match &source.endpoint {
                Some(endpoint) => TavilySource::with_endpoint(client, id, api_key, endpoint.clone()),
                None => TavilySource::new(client, id, api_key),
            })
        }
    };
    Ok(port)
}

/// Bind every configured source, in config (priority) order.
///
/// Fails fast on a missing API key so a run never starts half-configured.
#[instrument(skip_all, fields(sources = config.sources.len()))]
pub fn bind_sources(config: &AppConfig) -> Result<Vec<SourceBinding>> {
    let client = build_client()?;
    let probe_deadline = config.diagnostics.deadline();

    config
        .sources
        .iter()
        .map(|source| -> Result<SourceBinding> {
            let port = build_port(source, client.clone())?;
            debug!(source = %source.id, adapter = port.name(), "bound source");
            Ok(SourceBinding {
                port,
                request: source.request(),
                probe: source.probe_request(probe_deadline),
                label: source.label.clone(),
            })
        })
        .collect()
}
