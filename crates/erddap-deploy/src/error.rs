//! Error types for loading, reconciling and deploying datasets.xml.

use std::path::PathBuf;
use thiserror::Error;

use crate::monitor::MonitorError;

/// Errors that can occur while loading or deploying a configuration.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Failed to parse datasets.xml: {message}")]
    ParseXml { message: String },

    #[error("Malformed dataset configuration: {message}")]
    MalformedConfig { message: String },

    #[error("Duplicate datasetID(s) in datasets.xml: {}", .0.join(", "))]
    DuplicateDatasetId(Vec<String>),

    #[error("Cannot change encoding from {from} to {to} when saving the original text")]
    EncodingMismatch { from: String, to: String },

    #[error("Unsupported encoding '{0}', only UTF-8 is supported")]
    UnsupportedEncoding(String),

    #[error("Unable to sync since no datasets.xml was found for '{0}'")]
    NoReferenceConfig(String),

    #[error("A repository URL or an existing local path is required")]
    MissingRepository,

    #[error("Invalid secrets: {0}")]
    InvalidSecrets(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetworkError(String),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Git repository not initialized at '{0}'")]
    GitNotInitialized(PathBuf),

    #[error("Monitor synchronization failed: {0}")]
    Monitor(#[from] MonitorError),
}

impl From<serde_yaml::Error> for DeployError {
    fn from(err: serde_yaml::Error) -> Self {
        DeployError::Config(err.to_string())
    }
}

impl DeployError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeployError::GitNetworkError(_) => true,
            DeployError::Monitor(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> DeployError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return DeployError::GitNetworkError(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
    {
        return DeployError::GitAuthFailed(stderr.trim().to_string());
    }

    DeployError::GitOperation(stderr.trim().to_string())
}

/// Result type for deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network_error() {
        let err = classify_git_error("fatal: unable to access 'https://x/': Could not resolve host: x");
        assert!(matches!(err, DeployError::GitNetworkError(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth_error() {
        let err = classify_git_error("remote: Authentication failed for 'https://x/'");
        assert!(matches!(err, DeployError::GitAuthFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_fallback() {
        let err = classify_git_error("  error: pathspec 'nope' did not match  ");
        match err {
            DeployError::GitOperation(msg) => {
                assert_eq!(msg, "error: pathspec 'nope' did not match")
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id_message() {
        let err = DeployError::DuplicateDatasetId(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Duplicate datasetID(s) in datasets.xml: a, b");
    }
}
