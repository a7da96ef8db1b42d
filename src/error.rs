//! Error types for the collection pipeline.
//!
//! Only [`ConfigError`] can stop a run. Fetch and parse failures are scoped to
//! a single source: the pipeline records them as [`SourceFailure`]s and moves
//! on, so one broken agency page never hides the calls published elsewhere.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single HTTP fetch failed.
#[derive(Debug, Error)]
pub enum FetchErrorKind {
    /// The request did not complete within the configured timeout.
    #[error("timed out")]
    Timeout,

    /// Connection, TLS or body-decoding failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// 2xx with nothing in it.
    #[error("empty response body")]
    EmptyBody,
}

/// A failed fetch for one named source.
#[derive(Debug, Error)]
#[error("fetch failed for {source_name}: {kind}")]
pub struct FetchError {
    pub source_name: String,
    #[source]
    pub kind: FetchErrorKind,
}

impl FetchError {
    pub fn new(source_name: impl Into<String>, kind: FetchErrorKind) -> Self {
        Self {
            source_name: source_name.into(),
            kind,
        }
    }

    /// Classify a `reqwest` error for the given source.
    pub fn from_reqwest(source_name: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if let Some(status) = err.status() {
            FetchErrorKind::Status(status.as_u16())
        } else {
            FetchErrorKind::Transport(err.to_string())
        };
        Self::new(source_name, kind)
    }
}

/// A feed body that could not be read as XML.
#[derive(Debug, Error)]
#[error("malformed feed from {source_name}: {message}")]
pub struct ParseError {
    pub source_name: String,
    pub message: String,
}

/// Problems loading the source registry or relevance patterns.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("source {name:?} has an invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        name: String,
        endpoint: String,
        reason: String,
    },

    #[error("invalid relevance pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no sources configured")]
    NoSources,
}

/// Per-source failure recorded in the run report.
#[derive(Debug, Error)]
pub enum SourceFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SourceFailure {
    pub fn source_name(&self) -> &str {
        match self {
            SourceFailure::Fetch(e) => &e.source_name,
            SourceFailure::Parse(e) => &e.source_name,
        }
    }
}
