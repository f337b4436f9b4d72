//! The scheduler RPC surface consumed by the client.
//!
//! Every call returns a response carrying a [`ResponseCode`] and a
//! message; callers run it through [`crate::validate`] before using
//! anything else in it. Transport failures surface as `Err`.

use serde::{Deserialize, Serialize};

use convoy_core::{
    JobDescriptor, Quota, ResponseCode, ScheduledTask, SessionKey, ShardId, TaskQuery, UpdateResult,
};

use crate::error::ClientResult;

/// Anything the scheduler returns.
pub trait SchedulerResponse {
    fn code(&self) -> ResponseCode;
    fn message(&self) -> &str;
}

/// Plain acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub code: ResponseCode,
    #[serde(default)]
    pub message: String,
}

impl Response {
    pub fn ok(message: &str) -> Self {
        Self {
            code: ResponseCode::Ok,
            message: message.to_string(),
        }
    }

    pub fn with_code(code: ResponseCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartUpdateResponse {
    pub code: ResponseCode,
    #[serde(default)]
    pub message: String,
    pub update_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksStatusResponse {
    pub code: ResponseCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tasks: Vec<ScheduledTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaResponse {
    pub code: ResponseCode,
    #[serde(default)]
    pub message: String,
    pub quota: Option<Quota>,
}

macro_rules! impl_scheduler_response {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SchedulerResponse for $ty {
                fn code(&self) -> ResponseCode {
                    self.code
                }

                fn message(&self) -> &str {
                    &self.message
                }
            }
        )+
    };
}

impl_scheduler_response!(Response, StartUpdateResponse, TasksStatusResponse, QuotaResponse);

/// Calls the client issues against a scheduler.
pub trait SchedulerApi {
    fn create_job(&self, job: &JobDescriptor, session: &SessionKey) -> ClientResult<Response>;

    fn start_cron_job(
        &self,
        role: &str,
        job_name: &str,
        session: &SessionKey,
    ) -> ClientResult<Response>;

    fn kill_tasks(&self, query: &TaskQuery, session: &SessionKey) -> ClientResult<Response>;

    fn get_tasks_status(&self, query: &TaskQuery) -> ClientResult<TasksStatusResponse>;

    fn start_update(
        &self,
        job: &JobDescriptor,
        session: &SessionKey,
    ) -> ClientResult<StartUpdateResponse>;

    /// Close an update transaction. `token` is `None` only for `TERMINATE`.
    fn finish_update(
        &self,
        role: &str,
        job_name: &str,
        result: UpdateResult,
        token: Option<&str>,
        session: &SessionKey,
    ) -> ClientResult<Response>;

    /// Restart `shards` on the configuration staged by `start_update`.
    fn restart_shards(
        &self,
        role: &str,
        job_name: &str,
        shards: &[ShardId],
        token: &str,
        session: &SessionKey,
    ) -> ClientResult<Response>;

    /// Return `shards` to the configuration from before the update.
    fn rollback_shards(
        &self,
        role: &str,
        job_name: &str,
        shards: &[ShardId],
        token: &str,
        session: &SessionKey,
    ) -> ClientResult<Response>;

    fn get_quota(&self, role: &str) -> ClientResult<QuotaResponse>;

    fn set_quota(&self, role: &str, quota: &Quota, session: &SessionKey) -> ClientResult<Response>;
}
