//! Convoy core types, cluster target parsing, and configuration files.

pub mod cluster;
pub mod config;
pub mod error;
pub mod types;

pub use cluster::{ClusterTarget, DEFAULT_DISCOVERY_PORT, LOCAL_RUN_CLUSTER};
pub use config::{ClientConfig, ClusterEntry, ClusterRegistry, JobConfig, JobSpec};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
