//! Application configuration for Gazette.
//!
//! User config lives at `~/.gazette/gazette.toml`.
//! CLI flags override config file values, which override defaults.
//! Source order in the file is the section order of the newsletter.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GazetteError, Result};
use crate::types::{FormatTag, NewsletterHeader, RetrievalQuery, RetrievalRequest, SourceId};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "gazette.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".gazette";

/// Document types end up in file names.
static DOCUMENT_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Config structs (matching gazette.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where and how artifacts are written.
    #[serde(default)]
    pub output: OutputConfig,

    /// Newsletter title block.
    #[serde(default)]
    pub header: HeaderConfig,

    /// Connectivity check settings.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Retrieval sources, in section priority order.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            header: HeaderConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            sources: default_sources(),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory artifacts are written into.
    #[serde(default = "default_output_root")]
    pub root: String,

    /// Artifact name prefix: `{document_type}_{YYYYMMDD_HHMMSS}.{ext}`.
    #[serde(default = "default_document_type")]
    pub document_type: String,

    /// Formats rendered on every run.
    #[serde(default = "default_formats")]
    pub formats: Vec<FormatTag>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            document_type: default_document_type(),
            formats: default_formats(),
        }
    }
}

fn default_output_root() -> String {
    "./output".into()
}
fn default_document_type() -> String {
    "ai_newsletter".into()
}
fn default_formats() -> Vec<FormatTag> {
    vec![FormatTag::Html, FormatTag::Text]
}

/// `[header]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderConfig {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_headline")]
    pub headline: String,

    /// Closing line of the footer (renderer default when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            headline: default_headline(),
            tagline: None,
        }
    }
}

impl From<&HeaderConfig> for NewsletterHeader {
    fn from(config: &HeaderConfig) -> Self {
        Self {
            title: config.title.clone(),
            headline: config.headline.clone(),
        }
    }
}

fn default_title() -> String {
    "AI Agents Newsletter".into()
}
fn default_headline() -> String {
    "Latest developments in AI and agent technologies".into()
}

/// `[diagnostics]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Per-source deadline for the connectivity check.
    #[serde(default = "default_diagnostics_deadline")]
    pub deadline_secs: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_diagnostics_deadline(),
        }
    }
}

impl DiagnosticsConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

fn default_diagnostics_deadline() -> u64 {
    30
}

/// Which adapter backs a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// arXiv Atom export API.
    Arxiv,
    /// Tavily web search API.
    Tavily,
}

/// `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source identifier.
    pub id: String,

    /// Adapter kind.
    pub kind: SourceKind,

    /// Section heading in the rendered newsletter.
    pub label: String,

    /// Query text handed to the source on every run.
    pub query: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Branch deadline for a normal run.
    #[serde(default = "default_source_deadline")]
    pub deadline_secs: u64,

    /// Query used by `gazette check` (defaults to `query`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_query: Option<String>,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Endpoint override (mostly for self-hosted proxies and tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Adapter-specific extras passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

fn default_max_results() -> usize {
    5
}
fn default_source_deadline() -> u64 {
    60
}

impl SourceConfig {
    pub fn source_id(&self) -> SourceId {
        SourceId::new(self.id.clone())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Build the request for a normal run.
    pub fn request(&self) -> RetrievalRequest {
        RetrievalRequest {
            source: self.source_id(),
            query: self.query_for(&self.query, self.max_results),
            deadline: self.deadline(),
        }
    }

    /// Build the connectivity-check request (one item, diagnostics deadline).
    pub fn probe_request(&self, deadline: Duration) -> RetrievalRequest {
        let text = self.probe_query.as_deref().unwrap_or(&self.query);
        RetrievalRequest {
            source: self.source_id(),
            query: self.query_for(text, 1),
            deadline,
        }
    }

    fn query_for(&self, text: &str, max_results: usize) -> RetrievalQuery {
        let mut query = RetrievalQuery::new(text).with_max_results(max_results);
        query.params = self.params.clone();
        query
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            id: "arxiv".into(),
            kind: SourceKind::Arxiv,
            label: "Latest Research Papers".into(),
            query: r#"all:"agentic systems" OR all:"multi-agent systems" OR all:"AI agents""#
                .into(),
            max_results: 3,
            deadline_secs: default_source_deadline(),
            probe_query: Some(r#"all:"artificial intelligence""#.into()),
            api_key_env: None,
            endpoint: None,
            params: BTreeMap::new(),
        },
        SourceConfig {
            id: "web".into(),
            kind: SourceKind::Tavily,
            label: "AI Tools & Updates".into(),
            query: "latest AI agent tools, frameworks, tutorials and news".into(),
            max_results: 7,
            deadline_secs: default_source_deadline(),
            probe_query: Some("latest AI news".into()),
            api_key_env: Some("TAVILY_API_KEY".into()),
            endpoint: None,
            params: BTreeMap::from([("topic".to_string(), "news".to_string())]),
        },
    ]
}

// ---------------------------------------------------------------------------
// Persist config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime persistence configuration: merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Directory artifacts are written into.
    pub output_root: PathBuf,
    /// Artifact name prefix.
    pub document_type: String,
    /// Formats to render.
    pub formats: Vec<FormatTag>,
}

impl From<&AppConfig> for PersistConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_root: PathBuf::from(&config.output.root),
            document_type: config.output.document_type.clone(),
            formats: config.output.formats.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(GazetteError::config("at least one [[sources]] entry is required"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(GazetteError::config("source id must not be empty"));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(GazetteError::config(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
            if source.deadline_secs == 0 {
                return Err(GazetteError::config(format!(
                    "source '{}': deadline_secs must be greater than zero",
                    source.id
                )));
            }
        }

        if self.diagnostics.deadline_secs == 0 {
            return Err(GazetteError::config(
                "diagnostics.deadline_secs must be greater than zero",
            ));
        }

        if self.output.formats.is_empty() {
            return Err(GazetteError::config("output.formats must list at least one format"));
        }

        if !DOCUMENT_TYPE_RE.is_match(&self.output.document_type) {
            return Err(GazetteError::config(format!(
                "output.document_type '{}' may only contain letters, digits, '_' and '-'",
                self.output.document_type
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.gazette/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GazetteError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.gazette/gazette.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GazetteError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| GazetteError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GazetteError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GazetteError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GazetteError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key a source needs from its configured env var.
///
/// Returns `Ok(None)` for sources that need no key.
pub fn resolve_api_key(source: &SourceConfig) -> Result<Option<String>> {
    let Some(var_name) = source.api_key_env.as_deref() else {
        return Ok(None);
    };
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(Some(val)),
        _ => Err(GazetteError::config(format!(
            "API key for source '{}' not found. Set the {var_name} environment variable.",
            source.id
        ))),
    }
}
