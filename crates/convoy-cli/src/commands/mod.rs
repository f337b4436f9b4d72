//! Command handlers. Each takes the per-invocation [`Context`].

pub mod job;
pub mod quota;
pub mod update;

#[cfg(test)]
pub mod testing;

use std::rc::Rc;

use anyhow::{Context as _, bail};
use tracing::info;

use convoy_client::auth::current_user;
use convoy_client::staging::artifact_destination;
use convoy_client::{
    ArtifactStager, Clock, ConnectionRouter, HostnameLocality, HttpConnector, KeyFileSigner,
    ProcessShellRunner, RegistryTunnelLookup, RemoteLogin, SchedulerSession, SessionAuthenticator,
    ShellRunner, SystemClock,
};
use convoy_core::{ClientConfig, JobConfig};

use crate::{GlobalArgs, JobFileArgs};

/// Everything a handler needs for one invocation.
pub struct Context {
    pub session: SchedulerSession,
    pub auth: SessionAuthenticator,
    pub runner: Box<dyn ShellRunner>,
    pub clock: Rc<dyn Clock>,
    pub copy_app_from: Option<String>,
    pub tunnel_as: Option<String>,
}

impl Context {
    /// Wire the real capabilities from the client configuration.
    pub fn from_config(config: &ClientConfig, global: &GlobalArgs) -> Self {
        let tunnel_user = global.tunnel_as.clone().unwrap_or_else(current_user);
        let router = ConnectionRouter::new(
            config.clusters.clone(),
            Box::new(HostnameLocality::new(
                config.locality.production_domains.clone(),
            )),
            Box::new(RegistryTunnelLookup::new(config.clusters.clone())),
            Box::new(HttpConnector::new(config, &tunnel_user)),
        );

        Self {
            session: SchedulerSession::new(router, global.cluster.clone()),
            auth: SessionAuthenticator::new(Box::new(KeyFileSigner::new(
                config.session_key_path(),
            ))),
            runner: Box::new(ProcessShellRunner),
            clock: Rc::new(SystemClock),
            copy_app_from: global.copy_app_from.clone(),
            tunnel_as: global.tunnel_as.clone(),
        }
    }

    /// Load the job named on the command line and make it the session's config.
    pub fn load_job(&mut self, args: &JobFileArgs) -> anyhow::Result<()> {
        let config = JobConfig::load(&args.config, &args.job)
            .with_context(|| format!("failed to load job {} from {}", args.job, args.config.display()))?;
        self.session.set_config(config);
        Ok(())
    }

    /// Copy `--copy_app_from` into the cluster's artifact store, if given.
    pub fn stage_artifact(&mut self) -> anyhow::Result<()> {
        let Some(source) = self.copy_app_from.clone() else {
            return Ok(());
        };

        let config = self.session.config()?;
        let role = config.spec().role.clone();
        let artifact_path = config.artifact_path().map(str::to_string);

        let cluster = self.session.cluster()?;
        let Some(cluster_name) = cluster.name() else {
            bail!("cannot copy an artifact to a local scheduler ({cluster})");
        };
        let destination =
            artifact_destination(self.session.registry(), cluster_name, artifact_path.as_deref())?;

        let proxy = self.session.tunnel_proxy()?.map(|host| {
            RemoteLogin::new(self.tunnel_as.as_deref().unwrap_or(&role), &host)
        });

        info!(%cluster, %destination, "staging artifact");
        ArtifactStager::new(self.runner.as_ref()).stage(&source, &destination, proxy.as_ref())?;
        Ok(())
    }
}
