//! Tunnel hosts and SSH port forwards.
//!
//! From outside the production network every scheduler-bound connection
//! and every artifact copy goes through the cluster's tunnel host.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use convoy_core::ClusterRegistry;

use crate::error::{ClientError, ClientResult};

const FORWARD_READY_TIMEOUT: Duration = Duration::from_secs(10);
const FORWARD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Finds the tunnel host for a cluster, if it has one.
pub trait TunnelLookup {
    fn tunnel_host(&self, cluster: &str) -> Option<String>;
}

/// Tunnel hosts as listed in the cluster registry.
pub struct RegistryTunnelLookup {
    registry: ClusterRegistry,
}

impl RegistryTunnelLookup {
    pub fn new(registry: ClusterRegistry) -> Self {
        Self { registry }
    }
}

impl TunnelLookup for RegistryTunnelLookup {
    fn tunnel_host(&self, cluster: &str) -> Option<String> {
        self.registry
            .get(cluster)
            .and_then(|entry| entry.tunnel_host.clone())
    }
}

/// A local port forwarded to `remote_host:remote_port` through `ssh -L`.
///
/// The forward lives until this value is dropped.
#[derive(Debug)]
pub struct SshForward {
    child: Child,
    local_port: u16,
    tunnel_host: String,
}

impl SshForward {
    pub fn open(
        tunnel_host: &str,
        user: &str,
        remote_host: &str,
        remote_port: u16,
    ) -> ClientResult<Self> {
        let tunnel_error = |reason: String| ClientError::Tunnel {
            host: tunnel_host.to_string(),
            reason,
        };

        let local_port = free_local_port().map_err(|e| tunnel_error(e.to_string()))?;
        let spec = format!("{local_port}:{remote_host}:{remote_port}");

        debug!(%tunnel_host, %spec, "opening ssh forward");
        let child = Command::new("ssh")
            .args(["-N", "-o", "ExitOnForwardFailure=yes", "-o", "BatchMode=yes"])
            .arg("-L")
            .arg(&spec)
            .arg(format!("{user}@{tunnel_host}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| tunnel_error(format!("failed to execute 'ssh': {e}")))?;

        let mut forward = Self {
            child,
            local_port,
            tunnel_host: tunnel_host.to_string(),
        };
        forward.wait_ready().map_err(tunnel_error)?;

        info!(%tunnel_host, local_port, "proxying {remote_host}:{remote_port}");
        Ok(forward)
    }

    /// Loopback address that reaches the remote end.
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.local_port))
    }

    fn wait_ready(&mut self) -> Result<(), String> {
        let deadline = Instant::now() + FORWARD_READY_TIMEOUT;
        let addr = self.local_addr();
        loop {
            if let Some(status) = self.child.try_wait().map_err(|e| e.to_string())? {
                return Err(format!("ssh exited early with {status}"));
            }
            if TcpStream::connect_timeout(&addr, FORWARD_POLL_INTERVAL).is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(format!(
                    "forward not ready after {}s",
                    FORWARD_READY_TIMEOUT.as_secs()
                ));
            }
            thread::sleep(FORWARD_POLL_INTERVAL);
        }
    }
}

impl Drop for SshForward {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!(tunnel_host = %self.tunnel_host, error = %e, "failed to stop ssh forward");
        }
        let _ = self.child.wait();
    }
}

fn free_local_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::ClusterEntry;

    #[test]
    fn lookup_reads_registry() {
        let mut registry = ClusterRegistry::default();
        registry.insert(
            "smf1",
            ClusterEntry {
                tunnel_host: Some("nest1.smf1".to_string()),
                ..Default::default()
            },
        );
        registry.insert("atla", ClusterEntry::default());

        let lookup = RegistryTunnelLookup::new(registry);
        assert_eq!(lookup.tunnel_host("smf1").as_deref(), Some("nest1.smf1"));
        assert_eq!(lookup.tunnel_host("atla"), None);
        assert_eq!(lookup.tunnel_host("unknown"), None);
    }

    #[test]
    fn free_port_is_nonzero() {
        assert_ne!(free_local_port().unwrap(), 0);
    }
}
