//! Scheduler discovery — which host is the live scheduler for a cluster?
//!
//! Each cluster lists its discovery hosts in the registry. They are asked
//! in order for the current leader:
//!
//! ```text
//! GET http://<discovery-host>:<port>/v1/leader/<cluster>
//! 200 {"host": "sched3.smf1", "port": 8081}
//! 404 no leader elected
//! ```

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::tunnel::SshForward;

/// Address of a live scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerEndpoint {
    pub host: String,
    pub port: u16,
}

pub trait Discovery {
    /// Find the live scheduler of `cluster` via the discovery service on `port`.
    fn locate(&self, cluster: &str, port: u16) -> ClientResult<Option<SchedulerEndpoint>>;
}

/// Tunnel host and login used to reach hosts inside the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRoute {
    pub host: String,
    pub user: String,
}

/// Leader lookup over HTTP against the registry's discovery hosts.
pub struct HttpDiscovery {
    hosts: Vec<String>,
    http_port: Option<u16>,
    tunnel: Option<TunnelRoute>,
    http: Client,
}

impl HttpDiscovery {
    /// `http_port` replaces the coordination port when the HTTP endpoint
    /// listens elsewhere.
    pub fn new(
        hosts: Vec<String>,
        http_port: Option<u16>,
        tunnel: Option<TunnelRoute>,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport {
                method: "discovery".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            hosts,
            http_port,
            tunnel,
            http,
        })
    }

    fn ask(&self, host: &str, port: u16, cluster: &str) -> ClientResult<Option<SchedulerEndpoint>> {
        // Held until the request completes.
        let forward = match &self.tunnel {
            Some(route) => Some(SshForward::open(&route.host, &route.user, host, port)?),
            None => None,
        };
        let addr = match &forward {
            Some(f) => f.local_addr().to_string(),
            None => format!("{host}:{port}"),
        };

        let url = leader_url(&addr, cluster);
        debug!(%url, "asking discovery host for leader");

        let discovery_error = |reason: String| ClientError::Discovery {
            cluster: cluster.to_string(),
            reason,
        };
        let resp = self
            .http
            .get(&url)
            .send()
            .map_err(|e| discovery_error(format!("{host}: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => resp
                .json::<SchedulerEndpoint>()
                .map(Some)
                .map_err(|e| discovery_error(format!("{host}: {e}"))),
            status => Err(discovery_error(format!("{host}: HTTP {status}"))),
        }
    }
}

impl Discovery for HttpDiscovery {
    fn locate(&self, cluster: &str, port: u16) -> ClientResult<Option<SchedulerEndpoint>> {
        if self.hosts.is_empty() {
            return Err(ClientError::Discovery {
                cluster: cluster.to_string(),
                reason: "no discovery hosts registered".to_string(),
            });
        }

        let port = self.http_port.unwrap_or(port);
        let mut answered = false;
        let mut last_error = None;
        for host in &self.hosts {
            match self.ask(host, port, cluster) {
                Ok(Some(endpoint)) => {
                    debug!(%cluster, host = %endpoint.host, port = endpoint.port, "found scheduler");
                    return Ok(Some(endpoint));
                }
                Ok(None) => {
                    answered = true;
                    debug!(%cluster, %host, "discovery host reports no leader");
                }
                Err(e) => {
                    warn!(%cluster, %host, error = %e, "discovery host unavailable");
                    last_error = Some(e);
                }
            }
        }

        // A host that answered without a leader means nobody is elected.
        match (answered, last_error) {
            (false, Some(e)) => Err(e),
            _ => Ok(None),
        }
    }
}

fn leader_url(addr: &str, cluster: &str) -> String {
    format!("http://{addr}/v1/leader/{cluster}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_url_shape() {
        assert_eq!(
            leader_url("zk1.smf1:2181", "smf1"),
            "http://zk1.smf1:2181/v1/leader/smf1"
        );
    }

    #[test]
    fn endpoint_from_json() {
        let endpoint: SchedulerEndpoint =
            serde_json::from_str(r#"{"host":"sched3.smf1","port":8081}"#).unwrap();
        assert_eq!(
            endpoint,
            SchedulerEndpoint {
                host: "sched3.smf1".to_string(),
                port: 8081
            }
        );
    }

    #[test]
    fn no_hosts_is_an_error() {
        let discovery = HttpDiscovery::new(vec![], None, None, Duration::from_secs(1)).unwrap();
        let err = discovery.locate("smf1", 2181).unwrap_err();
        assert!(matches!(err, ClientError::Discovery { .. }));
    }
}
