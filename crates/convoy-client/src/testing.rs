//! Test doubles for the client's capabilities, shared with dependent
//! crates through the `test-util` feature.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use convoy_core::{
    ClusterEntry, ClusterRegistry, JobConfig, JobDescriptor, JobSpec, Quota, ResponseCode,
    ScheduleStatus, ScheduledTask, SessionKey, ShardId, TaskConfig, TaskQuery, UpdateResult,
    UpdateSettings, LOCAL_RUN_CLUSTER,
};

use crate::api::{QuotaResponse, Response, SchedulerApi, StartUpdateResponse, TasksStatusResponse};
use crate::clock::Clock;
use crate::error::ClientResult;
use crate::locality::{Locality, LocalityProbe};
use crate::router::{ClientSpec, SchedulerConnector};
use crate::tunnel::TunnelLookup;

// ── Scheduler ──────────────────────────────────────────────────────

/// One recorded scheduler call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateJob {
        job: JobDescriptor,
        session: SessionKey,
    },
    StartCronJob {
        role: String,
        job_name: String,
    },
    KillTasks {
        query: TaskQuery,
    },
    GetTasksStatus {
        query: TaskQuery,
    },
    StartUpdate {
        job_name: String,
    },
    FinishUpdate {
        role: String,
        job_name: String,
        result: UpdateResult,
        token: Option<String>,
    },
    RestartShards {
        shards: Vec<ShardId>,
        token: String,
    },
    RollbackShards {
        shards: Vec<ShardId>,
        token: String,
    },
    GetQuota {
        role: String,
    },
    SetQuota {
        role: String,
        quota: Quota,
    },
}

impl Call {
    pub fn method(&self) -> &'static str {
        match self {
            Call::CreateJob { .. } => "createJob",
            Call::StartCronJob { .. } => "startCronJob",
            Call::KillTasks { .. } => "killTasks",
            Call::GetTasksStatus { .. } => "getTasksStatus",
            Call::StartUpdate { .. } => "startUpdate",
            Call::FinishUpdate { .. } => "finishUpdate",
            Call::RestartShards { .. } => "restartShards",
            Call::RollbackShards { .. } => "rollbackShards",
            Call::GetQuota { .. } => "getQuota",
            Call::SetQuota { .. } => "setQuota",
        }
    }
}

/// Scheduler that records every call and answers OK unless told otherwise.
///
/// `restart_shards` moves each shard to its next scripted status (RUNNING
/// when nothing is scripted); the last scripted status sticks.
#[derive(Default)]
pub struct MockScheduler {
    calls: RefCell<Vec<Call>>,
    sessions: RefCell<Vec<SessionKey>>,
    codes: HashMap<&'static str, ResponseCode>,
    update_token: Option<String>,
    quota: Option<Quota>,
    tasks: RefCell<Vec<ScheduledTask>>,
    restart_outcomes: RefCell<BTreeMap<ShardId, VecDeque<ScheduleStatus>>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` with `code` instead of OK.
    pub fn reject(mut self, method: &'static str, code: ResponseCode) -> Self {
        self.codes.insert(method, code);
        self
    }

    pub fn with_update_token(mut self, token: &str) -> Self {
        self.update_token = Some(token.to_string());
        self
    }

    pub fn with_quota(mut self, quota: Quota) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Statuses `shard` takes on successive restarts.
    pub fn with_restart_outcomes(self, shard: ShardId, outcomes: &[ScheduleStatus]) -> Self {
        self.restart_outcomes
            .borrow_mut()
            .insert(shard, outcomes.iter().copied().collect());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls.borrow().iter().map(Call::method).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.method() == method)
            .count()
    }

    /// Keys of the signed calls, in call order.
    pub fn sessions(&self) -> Vec<SessionKey> {
        self.sessions.borrow().clone()
    }

    /// Result and token of every `finishUpdate`.
    pub fn finished(&self) -> Vec<(UpdateResult, Option<String>)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::FinishUpdate { result, token, .. } => Some((*result, token.clone())),
                _ => None,
            })
            .collect()
    }

    /// Every shard named in a `restartShards` call.
    pub fn restarted(&self) -> BTreeSet<ShardId> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::RestartShards { shards, .. } => Some(shards.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn signed(&self, session: &SessionKey) {
        self.sessions.borrow_mut().push(session.clone());
    }

    fn record(&self, call: Call) -> (ResponseCode, String) {
        let method = call.method();
        self.calls.borrow_mut().push(call);
        let code = self.codes.get(method).copied().unwrap_or(ResponseCode::Ok);
        (code, format!("{method} handled"))
    }

    fn respond(&self, call: Call) -> ClientResult<Response> {
        let (code, message) = self.record(call);
        Ok(Response { code, message })
    }

    fn next_outcome(&self, shard: ShardId) -> ScheduleStatus {
        let mut outcomes = self.restart_outcomes.borrow_mut();
        match outcomes.get_mut(&shard) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(ScheduleStatus::Running),
            Some(queue) => queue.front().copied().unwrap_or(ScheduleStatus::Running),
            None => ScheduleStatus::Running,
        }
    }
}

impl SchedulerApi for MockScheduler {
    fn create_job(&self, job: &JobDescriptor, session: &SessionKey) -> ClientResult<Response> {
        self.signed(session);
        self.respond(Call::CreateJob {
            job: job.clone(),
            session: session.clone(),
        })
    }

    fn start_cron_job(
        &self,
        role: &str,
        job_name: &str,
        session: &SessionKey,
    ) -> ClientResult<Response> {
        self.signed(session);
        self.respond(Call::StartCronJob {
            role: role.to_string(),
            job_name: job_name.to_string(),
        })
    }

    fn kill_tasks(&self, query: &TaskQuery, session: &SessionKey) -> ClientResult<Response> {
        self.signed(session);
        self.respond(Call::KillTasks {
            query: query.clone(),
        })
    }

    fn get_tasks_status(&self, query: &TaskQuery) -> ClientResult<TasksStatusResponse> {
        let (code, message) = self.record(Call::GetTasksStatus {
            query: query.clone(),
        });
        let tasks = self
            .tasks
            .borrow()
            .iter()
            .filter(|t| {
                query
                    .shard_ids
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&t.shard_id))
            })
            .cloned()
            .collect();
        Ok(TasksStatusResponse {
            code,
            message,
            tasks,
        })
    }

    fn start_update(
        &self,
        job: &JobDescriptor,
        session: &SessionKey,
    ) -> ClientResult<StartUpdateResponse> {
        self.signed(session);
        let (code, message) = self.record(Call::StartUpdate {
            job_name: job.name.clone(),
        });
        Ok(StartUpdateResponse {
            code,
            message,
            update_token: self.update_token.clone(),
        })
    }

    fn finish_update(
        &self,
        role: &str,
        job_name: &str,
        result: UpdateResult,
        token: Option<&str>,
        session: &SessionKey,
    ) -> ClientResult<Response> {
        self.signed(session);
        self.respond(Call::FinishUpdate {
            role: role.to_string(),
            job_name: job_name.to_string(),
            result,
            token: token.map(str::to_string),
        })
    }

    fn restart_shards(
        &self,
        _role: &str,
        _job_name: &str,
        shards: &[ShardId],
        token: &str,
        session: &SessionKey,
    ) -> ClientResult<Response> {
        self.signed(session);
        let (code, message) = self.record(Call::RestartShards {
            shards: shards.to_vec(),
            token: token.to_string(),
        });
        if code == ResponseCode::Ok {
            for &shard in shards {
                let status = self.next_outcome(shard);
                let mut tasks = self.tasks.borrow_mut();
                match tasks.iter_mut().find(|t| t.shard_id == shard) {
                    Some(task) => task.status = status,
                    None => tasks.push(scheduled_task(shard, status, Some("host-a"))),
                }
            }
        }
        Ok(Response { code, message })
    }

    fn rollback_shards(
        &self,
        _role: &str,
        _job_name: &str,
        shards: &[ShardId],
        token: &str,
        session: &SessionKey,
    ) -> ClientResult<Response> {
        self.signed(session);
        self.respond(Call::RollbackShards {
            shards: shards.to_vec(),
            token: token.to_string(),
        })
    }

    fn get_quota(&self, role: &str) -> ClientResult<QuotaResponse> {
        let (code, message) = self.record(Call::GetQuota {
            role: role.to_string(),
        });
        Ok(QuotaResponse {
            code,
            message,
            quota: self.quota,
        })
    }

    fn set_quota(&self, role: &str, quota: &Quota, session: &SessionKey) -> ClientResult<Response> {
        self.signed(session);
        self.respond(Call::SetQuota {
            role: role.to_string(),
            quota: *quota,
        })
    }
}

// ── Routing capabilities ───────────────────────────────────────────

/// Records every spec it is asked to connect and hands out one scheduler.
#[derive(Clone)]
pub struct MockConnector {
    specs: Rc<RefCell<Vec<ClientSpec>>>,
    scheduler: Option<Rc<MockScheduler>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::with_scheduler(Rc::new(MockScheduler::new()))
    }

    pub fn with_scheduler(scheduler: Rc<MockScheduler>) -> Self {
        Self {
            specs: Rc::default(),
            scheduler: Some(scheduler),
        }
    }

    /// A connector that never finds a live scheduler.
    pub fn unreachable() -> Self {
        Self {
            specs: Rc::default(),
            scheduler: None,
        }
    }

    pub fn specs(&self) -> Vec<ClientSpec> {
        self.specs.borrow().clone()
    }
}

impl SchedulerConnector for MockConnector {
    fn connect(&self, spec: &ClientSpec) -> ClientResult<Option<Rc<dyn SchedulerApi>>> {
        self.specs.borrow_mut().push(spec.clone());
        Ok(self
            .scheduler
            .as_ref()
            .map(|s| Rc::clone(s) as Rc<dyn SchedulerApi>))
    }
}

pub struct FixedLocality(pub Locality);

impl LocalityProbe for FixedLocality {
    fn locality(&self) -> Locality {
        self.0
    }
}

pub struct StaticTunnels(HashMap<String, String>);

impl StaticTunnels {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(cluster, host)| (cluster.to_string(), host.to_string()))
                .collect(),
        )
    }
}

impl TunnelLookup for StaticTunnels {
    fn tunnel_host(&self, cluster: &str) -> Option<String> {
        self.0.get(cluster).cloned()
    }
}

/// Registry holding `smf1`, `atla` and the local-run cluster.
pub fn test_registry() -> ClusterRegistry {
    let mut registry = ClusterRegistry::default();
    registry.insert(
        "smf1",
        ClusterEntry {
            discovery_hosts: vec!["zk1.smf1".to_string()],
            tunnel_host: Some("nest1.smf1".to_string()),
            artifact_root: Some("hdfs://nn.smf1:8020".to_string()),
        },
    );
    registry.insert(
        "atla",
        ClusterEntry {
            discovery_hosts: vec!["zk1.atla".to_string()],
            ..ClusterEntry::default()
        },
    );
    registry.insert(LOCAL_RUN_CLUSTER, ClusterEntry::default());
    registry
}

// ── Fixtures ───────────────────────────────────────────────────────

pub fn task_config() -> TaskConfig {
    TaskConfig {
        num_cpus: 1.0,
        ram_mb: 1024,
        disk_mb: 2048,
        start_command: "./hello".to_string(),
        max_task_failures: 3,
        artifact_path: Some("/apps/eng/hello.zip".to_string()),
        requested_ports: vec![],
    }
}

pub fn scheduled_task(shard: ShardId, status: ScheduleStatus, host: Option<&str>) -> ScheduledTask {
    ScheduledTask {
        task_id: format!("hello-{shard}"),
        shard_id: shard,
        status,
        host: host.map(str::to_string),
        task: task_config(),
        assigned_ports: BTreeMap::new(),
        failure_count: 0,
    }
}

/// `eng/hello` with three instances, optionally pinned to `cluster`.
pub fn sample_job_config(cluster: Option<&str>) -> JobConfig {
    let spec = JobSpec {
        name: "hello".to_string(),
        role: "eng".to_string(),
        cluster: cluster.map(str::to_string),
        instances: 3,
        cron_schedule: None,
        task: task_config(),
        update: UpdateSettings::default(),
    };
    JobConfig::from_spec(Path::new("hello.toml"), spec).expect("valid sample job")
}

pub fn sample_job() -> JobDescriptor {
    sample_job_config(None).descriptor("alice")
}

pub fn session_key() -> SessionKey {
    SessionKey {
        user: "alice".to_string(),
        nonce: "00ff".to_string(),
        issued_at: 1,
        signature: "sig".to_string(),
    }
}

/// Clock whose `sleep` only moves `now` forward.
#[derive(Default)]
pub struct FakeClock {
    now: Cell<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}
