//! Error types for each component of the harvesting pipeline.
//!
//! Failures are scoped to the narrowest unit that owns them: a
//! [`SelectorError`] belongs to one query, a [`FetchError`] to one URL, a
//! [`RegistryError`] to instruction loading. None of them is allowed to
//! abort a batch; the extractor and the coordinator convert them into log
//! entries, absent fields, or skipped-URL reports.

use crate::models::Publisher;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or querying the instruction registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no instruction set registered for publisher \"{0}\"")]
    NotFound(Publisher),

    #[error("instruction set for publisher \"{0}\" was already registered")]
    Duplicate(Publisher),

    #[error("the unknown publisher cannot carry an instruction set")]
    UnknownPublisher,

    #[error("failed to parse instruction table: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read instruction table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a selector engine for a single query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("invalid CSS selector `{query}`: {reason}")]
    InvalidCss { query: String, reason: String },

    #[error("unsupported path expression `{query}`: {reason}")]
    UnsupportedPath { query: String, reason: String },
}

impl SelectorError {
    pub(crate) fn unsupported(query: &str, reason: impl Into<String>) -> Self {
        SelectorError::UnsupportedPath {
            query: query.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a document source.
///
/// Only [`FetchError::Timeout`], [`FetchError::Connection`] and
/// [`FetchError::SessionInvalid`] are transient; see
/// [`FetchError::is_transient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("connection error fetching {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("browsing session invalid while fetching {url}")]
    SessionInvalid { url: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("search for \"{keyword}\" failed: {reason}")]
    Search { keyword: String, reason: String },
}

/// Classification of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    Connection,
    SessionInvalid,
    Status,
    InvalidUrl,
    Search,
}

/// The failure kinds that are retried on a later pass.
pub const TRANSIENT_KINDS: [FetchErrorKind; 3] = [
    FetchErrorKind::Timeout,
    FetchErrorKind::Connection,
    FetchErrorKind::SessionInvalid,
];

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout { .. } => FetchErrorKind::Timeout,
            FetchError::Connection { .. } => FetchErrorKind::Connection,
            FetchError::SessionInvalid { .. } => FetchErrorKind::SessionInvalid,
            FetchError::Status { .. } => FetchErrorKind::Status,
            FetchError::InvalidUrl { .. } => FetchErrorKind::InvalidUrl,
            FetchError::Search { .. } => FetchErrorKind::Search,
        }
    }

    /// Whether this failure belongs to the transient taxonomy.
    pub fn is_transient(&self) -> bool {
        TRANSIENT_KINDS.contains(&self.kind())
    }

    /// Map a `reqwest` failure for `url` onto the fetch taxonomy.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_builder() {
            FetchError::InvalidUrl {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            // connect, request and body errors are all connectivity problems
            FetchError::Connection {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Errors raised while loading [`crate::config::HarvestConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("retry.max_passes must be at least 1")]
    NoPasses,
}
