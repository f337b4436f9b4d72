//! Shared types used across Convoy crates.
//!
//! These mirror the scheduler's RPC vocabulary: identities, jobs, tasks,
//! quota, session keys and the codes every response carries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Shard index within a job.
pub type ShardId = u32;

// ── Response codes ─────────────────────────────────────────────────

/// Outcome discriminator returned with every scheduler response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    InvalidRequest,
    Ok,
    Error,
    AuthFailed,
}

impl ResponseCode {
    /// Symbolic name as the scheduler spells it.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseCode::InvalidRequest => "INVALID_REQUEST",
            ResponseCode::Ok => "OK",
            ResponseCode::Error => "ERROR",
            ResponseCode::AuthFailed => "AUTH_FAILED",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an update transaction is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateResult {
    Success,
    Failed,
    Terminate,
}

impl UpdateResult {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateResult::Success => "SUCCESS",
            UpdateResult::Failed => "FAILED",
            UpdateResult::Terminate => "TERMINATE",
        }
    }
}

// ── Identity & session ────────────────────────────────────────────

/// Owner of a job: the role namespace plus the submitting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub role: String,
    pub user: String,
}

/// Signed proof of identity attached to a single scheduler call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKey {
    pub user: String,
    /// Random hex nonce, unique per key.
    pub nonce: String,
    /// Unix timestamp (seconds) when the key was minted.
    pub issued_at: u64,
    /// Hex signature over the fields above; empty until signed.
    pub signature: String,
}

impl SessionKey {
    /// An unsigned key for `user`.
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            nonce: String::new(),
            issued_at: 0,
            signature: String::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}

// ── Jobs ───────────────────────────────────────────────────────────

/// Per-shard task template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub num_cpus: f64,
    pub ram_mb: u64,
    pub disk_mb: u64,
    /// Command line run inside the sandbox.
    #[serde(default)]
    pub start_command: String,
    #[serde(default = "default_max_task_failures")]
    pub max_task_failures: u32,
    /// Artifact path inside the cluster's artifact store.
    #[serde(default)]
    pub artifact_path: Option<String>,
    /// Named ports the task requests.
    #[serde(default)]
    pub requested_ports: Vec<String>,
}

fn default_max_task_failures() -> u32 {
    1
}

/// Knobs for shard-by-shard updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// Shards restarted together.
    pub batch_size: u32,
    /// Seconds a restarted shard has to reach RUNNING.
    pub restart_threshold_secs: u64,
    /// Seconds a shard must stay RUNNING to count as healthy.
    pub watch_secs: u64,
    /// Retries allowed per shard before it counts as failed.
    pub max_per_shard_failures: u32,
    /// Failed shards tolerated before the update is rolled back.
    pub max_total_failures: u32,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            batch_size: 3,
            restart_threshold_secs: 60,
            watch_secs: 30,
            max_per_shard_failures: 0,
            max_total_failures: 0,
        }
    }
}

/// A job as submitted to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub owner: Identity,
    pub name: String,
    pub instances: u32,
    pub task: TaskConfig,
    pub cron_schedule: Option<String>,
    pub update: UpdateSettings,
}

impl JobDescriptor {
    /// All shard ids of this job, in order.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        (0..self.instances).collect()
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.owner.role, self.name)
    }
}

// ── Tasks ──────────────────────────────────────────────────────────

/// Lifecycle status of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Pending,
    Starting,
    Running,
    Finished,
    Failed,
    Killing,
    Killed,
    Lost,
}

impl ScheduleStatus {
    /// Pending, starting and running tasks are active; everything else is not.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Pending | ScheduleStatus::Starting | ScheduleStatus::Running
        )
    }

    /// Terminal states a task cannot leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Finished
                | ScheduleStatus::Failed
                | ScheduleStatus::Killed
                | ScheduleStatus::Lost
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::Starting => "STARTING",
            ScheduleStatus::Running => "RUNNING",
            ScheduleStatus::Finished => "FINISHED",
            ScheduleStatus::Failed => "FAILED",
            ScheduleStatus::Killing => "KILLING",
            ScheduleStatus::Killed => "KILLED",
            ScheduleStatus::Lost => "LOST",
        }
    }
}

/// A task as reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: String,
    pub shard_id: ShardId,
    pub status: ScheduleStatus,
    /// Host the task was assigned to; absent while pending.
    pub host: Option<String>,
    pub task: TaskConfig,
    #[serde(default)]
    pub assigned_ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub failure_count: u32,
}

/// Filter for task queries and kills.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    pub role: Option<String>,
    pub job_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_ids: Option<Vec<ShardId>>,
}

impl TaskQuery {
    pub fn job(role: &str, job_name: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            job_name: Some(job_name.to_string()),
            shard_ids: None,
        }
    }
}

// ── Quota ──────────────────────────────────────────────────────────

/// Per-role resource ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    pub num_cpus: f64,
    pub ram_mb: u64,
    pub disk_mb: u64,
}
