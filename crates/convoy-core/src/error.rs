//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while turning user input and config files into a target.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cluster not specified: pass --cluster or set `cluster` in the job configuration")]
    MissingCluster,

    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("the cluster argument is invalid: {cluster} (error: {reason})")]
    MalformedCluster { cluster: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("job `{job}` not found in {path}")]
    JobNotFound { job: String, path: PathBuf },

    #[error("invalid job `{job}`: {reason}")]
    InvalidJob { job: String, reason: String },
}
