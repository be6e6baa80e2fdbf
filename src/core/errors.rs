//! ARS-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ArsError>;

/// Top-level error type for the artifact reputation scanner.
#[derive(Debug, Error)]
pub enum ArsError {
    #[error("[ARS-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ARS-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[ARS-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[ARS-1004] missing API credentials: set {env_var} or api.key")]
    MissingCredentials { env_var: String },

    #[error("[ARS-1101] no lookup transport available: {details}")]
    TransportUnavailable { details: String },

    #[error("[ARS-2001] detection list {path} is malformed: {details}")]
    ListParse { path: PathBuf, details: String },

    #[error("[ARS-2002] invalid detection pattern: {details}")]
    InvalidPattern { details: String },

    #[error("[ARS-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[ARS-2201] lookup service request failed: {details}")]
    Http { details: String },

    #[error("[ARS-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ARS-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ArsError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ARS-1001",
            Self::MissingConfig { .. } => "ARS-1002",
            Self::ConfigParse { .. } => "ARS-1003",
            Self::MissingCredentials { .. } => "ARS-1004",
            Self::TransportUnavailable { .. } => "ARS-1101",
            Self::ListParse { .. } => "ARS-2001",
            Self::InvalidPattern { .. } => "ARS-2002",
            Self::Serialization { .. } => "ARS-2101",
            Self::Http { .. } => "ARS-2201",
            Self::Io { .. } => "ARS-3002",
            Self::Runtime { .. } => "ARS-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Http { .. } | Self::Runtime { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for ArsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ArsError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ArsError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<reqwest::Error> for ArsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http {
            details: value.to_string(),
        }
    }
}
