//! Client configuration and job configuration files.
//!
//! The client configuration (`~/.convoy/config.toml`) holds the cluster
//! registry plus locality, session and transport settings. Job
//! configuration files hold one or more `[[jobs]]` entries; commands pick
//! one by name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Identity, JobDescriptor, TaskConfig, UpdateSettings};

/// Environment variable naming the client configuration file.
pub const CONFIG_ENV: &str = "CONVOY_CONFIG";

// ── Client configuration ───────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub locality: LocalityConfig,
    pub session: SessionConfig,
    pub transport: TransportConfig,
    pub clusters: ClusterRegistry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalityConfig {
    /// Hostname suffixes that mark a machine as inside the production network.
    pub production_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Secret used to sign session keys. `~` expands to `$HOME`.
    pub key_file: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_file: "~/.convoy/session.key".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_secs: u64,
    /// Verify scheduler certificates. Tunneled connections present the
    /// scheduler's certificate on a loopback address, so operators going
    /// through a tunnel may need to turn this off.
    pub verify_tls: bool,
    /// Port the discovery service answers HTTP on, when it differs from
    /// the coordination port.
    pub discovery_http_port: Option<u16>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            verify_tls: true,
            discovery_http_port: None,
        }
    }
}

/// A registered cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterEntry {
    /// Hosts running the discovery service, tried in order.
    pub discovery_hosts: Vec<String>,
    /// Gateway host used from outside the production network.
    pub tunnel_host: Option<String>,
    /// Artifact store URI prefix, e.g. `hdfs://nn.smf1:8020`.
    pub artifact_root: Option<String>,
}

/// Known clusters, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterRegistry {
    clusters: BTreeMap<String, ClusterEntry>,
}

impl ClusterRegistry {
    pub fn insert(&mut self, name: &str, entry: ClusterEntry) {
        self.clusters.insert(name.to_string(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&ClusterEntry> {
        self.clusters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    pub fn assert_exists(&self, name: &str) -> ConfigResult<&ClusterEntry> {
        self.get(name)
            .ok_or_else(|| ConfigError::UnknownCluster(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = read(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the client configuration.
    ///
    /// Search order:
    /// 1. `explicit` (must exist)
    /// 2. `$CONVOY_CONFIG` (must exist)
    /// 3. `$HOME/.convoy/config.toml` (defaults when absent)
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Session key file with `~` expanded.
    pub fn session_key_path(&self) -> PathBuf {
        expand_home(&self.session.key_file)
    }
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| Path::new(&home).join(".convoy/config.toml"))
}

/// Expand a leading `~/` to `$HOME/`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => Path::new(&home).join(rest),
        _ => PathBuf::from(path),
    }
}

// ── Job configuration ──────────────────────────────────────────────

/// One `[[jobs]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub role: String,
    /// Cluster the job is meant for; `--cluster` overrides it.
    pub cluster: Option<String>,
    #[serde(default = "default_instances")]
    pub instances: u32,
    pub cron_schedule: Option<String>,
    pub task: TaskConfig,
    #[serde(default)]
    pub update: UpdateSettings,
}

fn default_instances() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfigFile {
    pub jobs: Vec<JobSpec>,
}

/// The job selected from a configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    path: PathBuf,
    spec: JobSpec,
}

impl JobConfig {
    /// Load `path` and select the job named `job`.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    pub fn load(path: &Path, job: &str) -> ConfigResult<Self> {
        let content = read(path)?;
        let parse_err = |reason: String| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        };
        let file: JobConfigFile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
            _ => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        };

        let spec = file
            .jobs
            .into_iter()
            .find(|j| j.name == job)
            .ok_or_else(|| ConfigError::JobNotFound {
                job: job.to_string(),
                path: path.to_path_buf(),
            })?;
        Self::from_spec(path, spec)
    }

    pub fn from_spec(path: &Path, spec: JobSpec) -> ConfigResult<Self> {
        validate(&spec)?;
        Ok(Self {
            path: path.to_path_buf(),
            spec,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn cluster(&self) -> Option<&str> {
        self.spec.cluster.as_deref()
    }

    pub fn artifact_path(&self) -> Option<&str> {
        self.spec.task.artifact_path.as_deref()
    }

    /// Build the wire descriptor, owned by `spec.role` and submitted by `user`.
    pub fn descriptor(&self, user: &str) -> JobDescriptor {
        JobDescriptor {
            owner: Identity {
                role: self.spec.role.clone(),
                user: user.to_string(),
            },
            name: self.spec.name.clone(),
            instances: self.spec.instances,
            task: self.spec.task.clone(),
            cron_schedule: self.spec.cron_schedule.clone(),
            update: self.spec.update.clone(),
        }
    }
}

fn validate(spec: &JobSpec) -> ConfigResult<()> {
    let invalid = |reason: &str| ConfigError::InvalidJob {
        job: spec.name.clone(),
        reason: reason.to_string(),
    };
    if spec.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if spec.role.trim().is_empty() {
        return Err(invalid("role must not be empty"));
    }
    if spec.instances == 0 {
        return Err(invalid("instances must be at least 1"));
    }
    if spec.update.batch_size == 0 {
        return Err(invalid("update.batch_size must be at least 1"));
    }
    if spec.task.num_cpus <= 0.0 {
        return Err(invalid("task.num_cpus must be positive"));
    }
    Ok(())
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
