//! Client error types.

use convoy_core::{ConfigError, ResponseCode};
use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("config is unset, load a job configuration before using it")]
    ConfigUnset,

    #[error("could not find scheduler (cluster = {0})")]
    SchedulerNotFound(String),

    #[error("discovery failed for cluster {cluster}: {reason}")]
    Discovery { cluster: String, reason: String },

    #[error("tunnel through {host} failed: {reason}")]
    Tunnel { host: String, reason: String },

    #[error("transport error calling {method}: {reason}")]
    Transport { method: String, reason: String },

    #[error("scheduler rejected the call: {code} (message: {message})")]
    Rejected { code: ResponseCode, message: String },

    #[error(
        "start-update response carried no update token; the update for {role}/{job} may still be open, run `convoy cancel_update {role} {job}` to release it"
    )]
    MissingUpdateToken { role: String, job: String },

    #[error("failed to sign session key for {user}: {reason}")]
    Signing { user: String, reason: String },

    #[error("invalid quota value: {0}")]
    InvalidQuota(String),

    #[error("update step out of order: {0}")]
    UpdateOrder(String),

    #[error("artifact staging failed: {0}")]
    Staging(String),
}
