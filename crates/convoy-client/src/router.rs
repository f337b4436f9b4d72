//! Connection routing — cluster argument to scheduler client.
//!
//! Resolution runs in two steps. [`ConnectionRouter::plan`] is pure: it
//! decides whether a tunnel is needed and how the client must be built.
//! [`ConnectionRouter::resolve`] then asks the [`SchedulerConnector`] to
//! build it.
//!
//! ```text
//! localhost:<port>      → Direct { port },            no tunnel
//! <name>[:<port>], prod → Discovery { force_no_tunnel: true }
//! <name>[:<port>], corp → Discovery { tunnel_host: lookup(name) }
//! sandbox-local         → Discovery { force_no_tunnel: true }
//! ```

use std::rc::Rc;

use tracing::{info, warn};

use convoy_core::{ClusterRegistry, ClusterTarget, DEFAULT_DISCOVERY_PORT, LOCAL_RUN_CLUSTER};

use crate::api::SchedulerApi;
use crate::error::{ClientError, ClientResult};
use crate::locality::{Locality, LocalityProbe};
use crate::tunnel::TunnelLookup;

/// How the RPC client must be constructed. Always TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSpec {
    /// Scheduler on localhost at `port`.
    Direct { port: u16 },
    /// Ask the cluster's discovery service on `port` for the live scheduler.
    Discovery {
        cluster: String,
        port: u16,
        /// True when no tunnel host was found; the connection goes direct.
        force_no_tunnel: bool,
        tunnel_host: Option<String>,
    },
}

/// Builds an RPC client; `Ok(None)` when no live scheduler was found.
pub trait SchedulerConnector {
    fn connect(&self, spec: &ClientSpec) -> ClientResult<Option<Rc<dyn SchedulerApi>>>;
}

/// Outcome of [`ConnectionRouter::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub tunnel_host: Option<String>,
    pub spec: ClientSpec,
}

/// A cluster target with its tunnel host and live client.
pub struct ResolvedConnection {
    pub target: ClusterTarget,
    pub tunnel_host: Option<String>,
    pub client: Rc<dyn SchedulerApi>,
}

impl std::fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConnection")
            .field("target", &self.target)
            .field("tunnel_host", &self.tunnel_host)
            .finish_non_exhaustive()
    }
}

pub struct ConnectionRouter {
    registry: ClusterRegistry,
    locality: Box<dyn LocalityProbe>,
    tunnels: Box<dyn TunnelLookup>,
    connector: Box<dyn SchedulerConnector>,
}

impl ConnectionRouter {
    pub fn new(
        registry: ClusterRegistry,
        locality: Box<dyn LocalityProbe>,
        tunnels: Box<dyn TunnelLookup>,
        connector: Box<dyn SchedulerConnector>,
    ) -> Self {
        Self {
            registry,
            locality,
            tunnels,
            connector,
        }
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Resolve the cluster to talk to and connect to its scheduler.
    pub fn resolve(
        &self,
        cmd_line_cluster: Option<&str>,
        config_cluster: Option<&str>,
    ) -> ClientResult<ResolvedConnection> {
        let arg = select_cluster(cmd_line_cluster, config_cluster)?;
        let target = ClusterTarget::resolve(&arg, &self.registry)?;
        let plan = self.plan(&target);

        let client = self
            .connector
            .connect(&plan.spec)?
            .ok_or_else(|| ClientError::SchedulerNotFound(target.to_string()))?;

        Ok(ResolvedConnection {
            target,
            tunnel_host: plan.tunnel_host,
            client,
        })
    }

    /// Decide tunnel and client construction for an already-validated target.
    pub fn plan(&self, target: &ClusterTarget) -> RoutePlan {
        match target {
            ClusterTarget::Local { port } => {
                info!("Attempting to talk to local scheduler.");
                RoutePlan {
                    tunnel_host: None,
                    spec: ClientSpec::Direct { port: *port },
                }
            }
            ClusterTarget::Named {
                name,
                discovery_port,
            } => {
                let locality = self.locality.locality();
                info!("Auto-detected location: {}", locality.label());

                let tunnel_host = if locality == Locality::Production || name == LOCAL_RUN_CLUSTER {
                    None
                } else {
                    self.tunnels.tunnel_host(name)
                };
                if let Some(host) = &tunnel_host {
                    info!("Proxying through {host}");
                }

                RoutePlan {
                    spec: ClientSpec::Discovery {
                        cluster: name.clone(),
                        port: discovery_port.unwrap_or(DEFAULT_DISCOVERY_PORT),
                        force_no_tunnel: tunnel_host.is_none(),
                        tunnel_host: tunnel_host.clone(),
                    },
                    tunnel_host,
                }
            }
        }
    }
}

/// Pick the cluster argument: the command line wins over the job
/// configuration, with a warning when they disagree.
pub fn select_cluster(
    cmd_line_cluster: Option<&str>,
    config_cluster: Option<&str>,
) -> ClientResult<String> {
    let cmd_line_cluster = cmd_line_cluster.filter(|c| !c.trim().is_empty());
    let config_cluster = config_cluster.filter(|c| !c.trim().is_empty());

    if let (Some(cmd), Some(cfg)) = (cmd_line_cluster, config_cluster) {
        if clusters_conflict(cmd, cfg) {
            warn!(
                "--cluster and the cluster in your configuration do not match. \
                 Using the cluster specified on the command line. (cluster = {cmd}, configured = {cfg})"
            );
        }
    }

    cmd_line_cluster
        .or(config_cluster)
        .map(str::to_string)
        .ok_or(ClientError::Config(convoy_core::ConfigError::MissingCluster))
}

fn clusters_conflict(cmd_line_cluster: &str, config_cluster: &str) -> bool {
    cmd_line_cluster.trim() != config_cluster.trim()
}
