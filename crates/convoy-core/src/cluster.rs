//! Cluster target parsing.
//!
//! A `--cluster` argument takes one of three shapes:
//!
//! - `localhost:<port>` — a scheduler running on this machine
//! - `<name>` — a registered cluster, discovered on the default port
//! - `<name>:<port>` — a registered cluster with an explicit discovery port

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ClusterRegistry;
use crate::error::{ConfigError, ConfigResult};

/// Discovery port used when a named target carries no port suffix.
pub const DEFAULT_DISCOVERY_PORT: u16 = 2181;

/// Cluster alias that always runs on the operator's own network; never tunneled.
pub const LOCAL_RUN_CLUSTER: &str = "sandbox-local";

const LOCALHOST: &str = "localhost";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterTarget {
    /// Scheduler listening on localhost; no discovery, no tunnel.
    Local { port: u16 },
    /// Registered cluster located through its discovery service.
    Named {
        name: String,
        discovery_port: Option<u16>,
    },
}

impl ClusterTarget {
    /// Parse the syntax of a cluster argument without consulting the registry.
    pub fn parse(arg: &str) -> ConfigResult<Self> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(ConfigError::MissingCluster);
        }

        let mut parts = arg.split(':');
        let name = parts.next().unwrap_or_default();
        let port = parts.next();
        if parts.next().is_some() {
            return Err(malformed(arg, "expected at most one `:`"));
        }
        if name.is_empty() {
            return Err(malformed(arg, "empty cluster name"));
        }

        let port = port.map(|p| parse_port(arg, p)).transpose()?;

        match (name, port) {
            (LOCALHOST, Some(port)) => Ok(ClusterTarget::Local { port }),
            (name, discovery_port) => Ok(ClusterTarget::Named {
                name: name.to_string(),
                discovery_port,
            }),
        }
    }

    /// Parse a cluster argument and check named targets against the registry.
    pub fn resolve(arg: &str, registry: &ClusterRegistry) -> ConfigResult<Self> {
        let target = Self::parse(arg)?;
        if let ClusterTarget::Named { name, .. } = &target {
            registry.assert_exists(name)?;
        }
        Ok(target)
    }

    /// Registered cluster name, or `None` for a local scheduler.
    pub fn name(&self) -> Option<&str> {
        match self {
            ClusterTarget::Local { .. } => None,
            ClusterTarget::Named { name, .. } => Some(name),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ClusterTarget::Local { .. })
    }
}

impl fmt::Display for ClusterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterTarget::Local { port } => write!(f, "{LOCALHOST}:{port}"),
            ClusterTarget::Named {
                name,
                discovery_port: Some(port),
            } => write!(f, "{name}:{port}"),
            ClusterTarget::Named { name, .. } => f.write_str(name),
        }
    }
}

fn parse_port(arg: &str, raw: &str) -> ConfigResult<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| malformed(arg, &e.to_string()))
}

fn malformed(arg: &str, reason: &str) -> ConfigError {
    ConfigError::MalformedCluster {
        cluster: arg.to_string(),
        reason: reason.to_string(),
    }
}
