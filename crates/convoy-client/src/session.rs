//! Per-invocation connection context.
//!
//! Built once when a command is dispatched and handed to the handler by
//! `&mut`. The first accessor that needs the scheduler resolves the
//! cluster through the [`ConnectionRouter`]; the result is kept for the
//! rest of the process so cluster and tunnel never change mid-command.

use std::rc::Rc;

use tracing::debug;

use convoy_core::{ClusterRegistry, ClusterTarget, JobConfig};

use crate::api::SchedulerApi;
use crate::error::{ClientError, ClientResult};
use crate::router::{ConnectionRouter, ResolvedConnection};

pub struct SchedulerSession {
    router: ConnectionRouter,
    cluster_arg: Option<String>,
    config: Option<JobConfig>,
    resolved: Option<ResolvedConnection>,
}

impl SchedulerSession {
    /// `cluster_arg` is the `--cluster` value, if any.
    pub fn new(router: ConnectionRouter, cluster_arg: Option<String>) -> Self {
        Self {
            router,
            cluster_arg,
            config: None,
            resolved: None,
        }
    }

    /// Record the job configuration loaded by the current command.
    ///
    /// Its `cluster` feeds resolution, unless the scheduler was already
    /// resolved, in which case the cached connection stays.
    pub fn set_config(&mut self, config: JobConfig) {
        if let Some(resolved) = &self.resolved {
            debug!(cluster = %resolved.target, "connection already resolved, keeping it");
        }
        self.config = Some(config);
    }

    pub fn config(&self) -> ClientResult<&JobConfig> {
        self.config.as_ref().ok_or(ClientError::ConfigUnset)
    }

    pub fn client(&mut self) -> ClientResult<Rc<dyn SchedulerApi>> {
        Ok(Rc::clone(&self.connection()?.client))
    }

    /// Tunnel host every transfer and remote command must go through.
    pub fn tunnel_proxy(&mut self) -> ClientResult<Option<String>> {
        Ok(self.connection()?.tunnel_host.clone())
    }

    pub fn cluster(&mut self) -> ClientResult<ClusterTarget> {
        Ok(self.connection()?.target.clone())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn registry(&self) -> &ClusterRegistry {
        self.router.registry()
    }

    fn connection(&mut self) -> ClientResult<&ResolvedConnection> {
        let resolved = match self.resolved.take() {
            Some(resolved) => resolved,
            None => {
                let config_cluster = self.config.as_ref().and_then(JobConfig::cluster);
                let resolved = self
                    .router
                    .resolve(self.cluster_arg.as_deref(), config_cluster)?;
                debug!(cluster = %resolved.target, tunnel = ?resolved.tunnel_host, "scheduler resolved");
                resolved
            }
        };
        Ok(self.resolved.insert(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locality::Locality;
    use crate::router::ClientSpec;
    use crate::testing::{
        sample_job_config, test_registry, FixedLocality, MockConnector, StaticTunnels,
    };

    fn session(cluster_arg: Option<&str>) -> (SchedulerSession, MockConnector) {
        let connector = MockConnector::new();
        let router = ConnectionRouter::new(
            test_registry(),
            Box::new(FixedLocality(Locality::Corp)),
            Box::new(StaticTunnels::new(&[("smf1", "nest1.smf1")])),
            Box::new(connector.clone()),
        );
        (
            SchedulerSession::new(router, cluster_arg.map(str::to_string)),
            connector,
        )
    }

    #[test]
    fn resolves_exactly_once() {
        let (mut session, connector) = session(Some("smf1"));
        assert!(!session.is_resolved());

        session.client().unwrap();
        assert_eq!(session.tunnel_proxy().unwrap().as_deref(), Some("nest1.smf1"));
        assert_eq!(session.cluster().unwrap().name(), Some("smf1"));
        session.client().unwrap();

        assert!(session.is_resolved());
        assert_eq!(connector.specs().len(), 1);
    }

    #[test]
    fn config_unset_is_a_precondition_error() {
        let (session, _) = session(Some("smf1"));
        assert!(matches!(session.config(), Err(ClientError::ConfigUnset)));
    }

    #[test]
    fn job_config_supplies_the_cluster() {
        let (mut session, connector) = session(None);
        session.set_config(sample_job_config(Some("localhost:4242")));

        assert!(session.cluster().unwrap().is_local());
        assert_eq!(connector.specs(), vec![ClientSpec::Direct { port: 4242 }]);
    }

    #[test]
    fn command_line_overrides_job_config() {
        let (mut session, _) = session(Some("localhost:1234"));
        session.set_config(sample_job_config(Some("smf1")));

        assert_eq!(
            session.cluster().unwrap(),
            ClusterTarget::Local { port: 1234 }
        );
        assert_eq!(session.tunnel_proxy().unwrap(), None);
    }

    #[test]
    fn late_config_does_not_re_resolve() {
        let (mut session, connector) = session(Some("localhost:1234"));
        session.client().unwrap();
        session.set_config(sample_job_config(Some("smf1")));
        session.client().unwrap();

        assert!(session.config().is_ok());
        assert_eq!(connector.specs(), vec![ClientSpec::Direct { port: 1234 }]);
    }

    #[test]
    fn missing_cluster_fails_without_connecting() {
        let (mut session, connector) = session(None);
        assert!(session.client().is_err());
        assert!(!session.is_resolved());
        assert!(connector.specs().is_empty());
    }
}
