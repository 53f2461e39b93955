//! Shared types, error model, and configuration for Gazette.
//!
//! This crate is the foundation depended on by all other Gazette crates.
//! It provides:
//! - [`GazetteError`] and [`SourceError`]: the error types
//! - Domain types ([`RetrievedItem`], [`RetrievalOutcome`], [`NewsletterDocument`], ...)
//! - Configuration ([`AppConfig`], [`PersistConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DiagnosticsConfig, HeaderConfig, OutputConfig, PersistConfig, SourceConfig,
    SourceKind, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_key,
};
pub use error::{GazetteError, Result, SourceError};
pub use types::{
    Coverage, FailedSource, FailureKind, FormatTag, NewsletterDocument, NewsletterHeader,
    PersistedArtifact, RetrievalOutcome, RetrievalQuery, RetrievalRequest, RetrievedItem, RunId,
    Section, SectionStatus, SourceId, provenance_token,
};
