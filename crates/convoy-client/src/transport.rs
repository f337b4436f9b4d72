//! JSON-over-HTTPS scheduler client and the connector that builds it.
//!
//! Each RPC is a `POST https://<scheduler>/api/v1/<method>` whose body
//! holds the call's arguments and whose response body is the scheduler's
//! response record.

use std::rc::Rc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use convoy_core::{
    ClientConfig, ClusterRegistry, JobDescriptor, Quota, SessionKey, ShardId, TaskQuery,
    UpdateResult,
};

use crate::api::{QuotaResponse, Response, SchedulerApi, StartUpdateResponse, TasksStatusResponse};
use crate::discovery::{Discovery, HttpDiscovery, TunnelRoute};
use crate::error::{ClientError, ClientResult};
use crate::router::{ClientSpec, SchedulerConnector};
use crate::tunnel::SshForward;

pub struct HttpSchedulerClient {
    base_url: String,
    http: Client,
    // Keeps a tunneled connection open for the client's lifetime.
    _forward: Option<SshForward>,
}

impl HttpSchedulerClient {
    pub fn new(
        host: &str,
        port: u16,
        timeout: Duration,
        verify_tls: bool,
        forward: Option<SshForward>,
    ) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .https_only(true)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| ClientError::Transport {
                method: "connect".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: format!("https://{host}:{port}"),
            http,
            _forward: forward,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn call<B: Serialize, R: DeserializeOwned>(&self, method: &str, body: &B) -> ClientResult<R> {
        let transport_error = |reason: String| ClientError::Transport {
            method: method.to_string(),
            reason,
        };

        let url = format!("{}/api/v1/{method}", self.base_url);
        debug!(%url, "calling scheduler");

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| transport_error(e.to_string()))?;

        // Rejections come back as non-2xx with a response record in the body.
        let status = resp.status();
        resp.json::<R>()
            .map_err(|e| transport_error(format!("HTTP {status}: {e}")))
    }
}

impl SchedulerApi for HttpSchedulerClient {
    fn create_job(&self, job: &JobDescriptor, session: &SessionKey) -> ClientResult<Response> {
        self.call("createJob", &json!({ "job": job, "session": session }))
    }

    fn start_cron_job(
        &self,
        role: &str,
        job_name: &str,
        session: &SessionKey,
    ) -> ClientResult<Response> {
        self.call(
            "startCronJob",
            &json!({ "role": role, "job_name": job_name, "session": session }),
        )
    }

    fn kill_tasks(&self, query: &TaskQuery, session: &SessionKey) -> ClientResult<Response> {
        self.call("killTasks", &json!({ "query": query, "session": session }))
    }

    fn get_tasks_status(&self, query: &TaskQuery) -> ClientResult<TasksStatusResponse> {
        self.call("getTasksStatus", &json!({ "query": query }))
    }

    fn start_update(
        &self,
        job: &JobDescriptor,
        session: &SessionKey,
    ) -> ClientResult<StartUpdateResponse> {
        self.call("startUpdate", &json!({ "job": job, "session": session }))
    }

    fn finish_update(
        &self,
        role: &str,
        job_name: &str,
        result: UpdateResult,
        token: Option<&str>,
        session: &SessionKey,
    ) -> ClientResult<Response> {
        self.call(
            "finishUpdate",
            &json!({
                "role": role,
                "job_name": job_name,
                "result": result,
                "update_token": token,
                "session": session,
            }),
        )
    }

    fn restart_shards(
        &self,
        role: &str,
        job_name: &str,
        shards: &[ShardId],
        token: &str,
        session: &SessionKey,
    ) -> ClientResult<Response> {
        self.call(
            "restartShards",
            &json!({
                "role": role,
                "job_name": job_name,
                "shards": shards,
                "update_token": token,
                "session": session,
            }),
        )
    }

    fn rollback_shards(
        &self,
        role: &str,
        job_name: &str,
        shards: &[ShardId],
        token: &str,
        session: &SessionKey,
    ) -> ClientResult<Response> {
        self.call(
            "rollbackShards",
            &json!({
                "role": role,
                "job_name": job_name,
                "shards": shards,
                "update_token": token,
                "session": session,
            }),
        )
    }

    fn get_quota(&self, role: &str) -> ClientResult<QuotaResponse> {
        self.call("getQuota", &json!({ "role": role }))
    }

    fn set_quota(&self, role: &str, quota: &Quota, session: &SessionKey) -> ClientResult<Response> {
        self.call(
            "setQuota",
            &json!({ "role": role, "quota": quota, "session": session }),
        )
    }
}

/// Builds [`HttpSchedulerClient`]s, locating schedulers through
/// [`HttpDiscovery`] and tunneling through `ssh` when the plan says so.
pub struct HttpConnector {
    registry: ClusterRegistry,
    timeout: Duration,
    verify_tls: bool,
    discovery_http_port: Option<u16>,
    tunnel_user: String,
}

impl HttpConnector {
    pub fn new(config: &ClientConfig, tunnel_user: &str) -> Self {
        Self {
            registry: config.clusters.clone(),
            timeout: Duration::from_secs(config.transport.timeout_secs),
            verify_tls: config.transport.verify_tls,
            discovery_http_port: config.transport.discovery_http_port,
            tunnel_user: tunnel_user.to_string(),
        }
    }
}

impl SchedulerConnector for HttpConnector {
    fn connect(&self, spec: &ClientSpec) -> ClientResult<Option<Rc<dyn SchedulerApi>>> {
        match spec {
            ClientSpec::Direct { port } => {
                let client =
                    HttpSchedulerClient::new("localhost", *port, self.timeout, self.verify_tls, None)?;
                Ok(Some(Rc::new(client)))
            }
            ClientSpec::Discovery {
                cluster,
                port,
                force_no_tunnel,
                tunnel_host,
            } => {
                let Some(entry) = self.registry.get(cluster) else {
                    return Ok(None);
                };
                let route = match (force_no_tunnel, tunnel_host) {
                    (false, Some(host)) => Some(TunnelRoute {
                        host: host.clone(),
                        user: self.tunnel_user.clone(),
                    }),
                    _ => None,
                };

                let discovery = HttpDiscovery::new(
                    entry.discovery_hosts.clone(),
                    self.discovery_http_port,
                    route.clone(),
                    self.timeout,
                )?;
                let Some(endpoint) = discovery.locate(cluster, *port)? else {
                    return Ok(None);
                };

                let client = match route {
                    Some(route) => {
                        let forward =
                            SshForward::open(&route.host, &route.user, &endpoint.host, endpoint.port)?;
                        let local = forward.local_addr();
                        HttpSchedulerClient::new(
                            &local.ip().to_string(),
                            local.port(),
                            self.timeout,
                            self.verify_tls,
                            Some(forward),
                        )?
                    }
                    None => HttpSchedulerClient::new(
                        &endpoint.host,
                        endpoint.port,
                        self.timeout,
                        self.verify_tls,
                        None,
                    )?,
                };
                debug!(%cluster, url = %client.base_url(), "scheduler client ready");
                Ok(Some(Rc::new(client)))
            }
        }
    }
}
