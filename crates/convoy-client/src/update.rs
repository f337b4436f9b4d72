//! Update orchestrator — drives the start/delegate/finish saga.
//!
//! ```text
//! Idle ──start_update──▶ Started ──delegate──▶ Delegated ──finish──▶ Committed
//!  │                                                          └────▶ Failed
//!  └──cancel──▶ Terminated
//! ```
//!
//! Shard convergence is delegated to a [`ShardUpdater`]; whatever retry
//! policy it has is its own. The orchestrator only looks at the set of
//! shards it reports as failed: empty commits the update, anything else
//! closes it as FAILED.

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::info;

use convoy_core::{JobDescriptor, SessionKey, ShardId, UpdateResult};

use crate::api::SchedulerApi;
use crate::clock::Clock;
use crate::error::{ClientError, ClientResult};
use crate::validate::{checked, validate};

/// Server-issued handle for one update transaction.
///
/// Not `Clone`: [`UpdateOrchestrator::finish`] consumes it, so a token
/// can close at most one transaction.
#[derive(Debug, PartialEq, Eq)]
pub struct UpdateToken(String);

impl UpdateToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Brings shards of a job onto the configuration staged by `start_update`.
pub trait ShardUpdater {
    /// Blocks until done. Returns the shards that could not converge.
    fn update(&mut self, job: &JobDescriptor) -> BTreeSet<ShardId>;
}

/// Everything a shard updater is bound to for one transaction.
pub struct UpdateBinding {
    pub client: Rc<dyn SchedulerApi>,
    pub clock: Rc<dyn Clock>,
    pub token: String,
    pub session: SessionKey,
}

pub trait UpdaterFactory {
    fn build(&self, binding: UpdateBinding) -> Box<dyn ShardUpdater>;
}

impl<F> UpdaterFactory for F
where
    F: Fn(UpdateBinding) -> Box<dyn ShardUpdater>,
{
    fn build(&self, binding: UpdateBinding) -> Box<dyn ShardUpdater> {
        self(binding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Started,
    Delegated,
    Committed,
    Failed,
    Terminated,
}

/// How a completed saga ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Committed,
    RolledBack { failed_shards: BTreeSet<ShardId> },
}

pub struct UpdateOrchestrator<'a> {
    client: Rc<dyn SchedulerApi>,
    clock: Rc<dyn Clock>,
    factory: &'a dyn UpdaterFactory,
    phase: UpdatePhase,
    failed_shards: BTreeSet<ShardId>,
}

impl<'a> UpdateOrchestrator<'a> {
    pub fn new(
        client: Rc<dyn SchedulerApi>,
        clock: Rc<dyn Clock>,
        factory: &'a dyn UpdaterFactory,
    ) -> Self {
        Self {
            client,
            clock,
            factory,
            phase: UpdatePhase::Idle,
            failed_shards: BTreeSet::new(),
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    /// Run the whole saga: start, delegate, finish.
    pub fn run(&mut self, job: &JobDescriptor, session: &SessionKey) -> ClientResult<UpdateOutcome> {
        let token = self.start_update(job, session)?;
        let failed_shards = self.delegate(job, &token, session)?;
        self.finish(&job.owner.role, &job.name, token, session)?;

        if failed_shards.is_empty() {
            Ok(UpdateOutcome::Committed)
        } else {
            Ok(UpdateOutcome::RolledBack { failed_shards })
        }
    }

    /// Open the server-side update transaction.
    pub fn start_update(
        &mut self,
        job: &JobDescriptor,
        session: &SessionKey,
    ) -> ClientResult<UpdateToken> {
        self.expect(UpdatePhase::Idle, "start_update")?;

        info!("Updating job {}", job.name);
        let resp = checked(self.client.start_update(job, session)?)?;
        let token = resp
            .update_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::MissingUpdateToken {
                role: job.owner.role.clone(),
                job: job.name.clone(),
            })?;

        self.phase = UpdatePhase::Started;
        Ok(UpdateToken(token))
    }

    /// Hand the job to a shard updater and wait for it.
    pub fn delegate(
        &mut self,
        job: &JobDescriptor,
        token: &UpdateToken,
        session: &SessionKey,
    ) -> ClientResult<BTreeSet<ShardId>> {
        self.expect(UpdatePhase::Started, "delegate")?;

        let mut updater = self.factory.build(UpdateBinding {
            client: Rc::clone(&self.client),
            clock: Rc::clone(&self.clock),
            token: token.as_str().to_string(),
            session: session.clone(),
        });
        let failed_shards = updater.update(job);

        if failed_shards.is_empty() {
            info!("Update Successful");
        } else {
            info!("Update reverted, failures detected on shards {failed_shards:?}");
        }

        self.failed_shards = failed_shards.clone();
        self.phase = UpdatePhase::Delegated;
        Ok(failed_shards)
    }

    /// Close the transaction: SUCCESS if no shard failed, FAILED otherwise.
    pub fn finish(
        &mut self,
        role: &str,
        job_name: &str,
        token: UpdateToken,
        session: &SessionKey,
    ) -> ClientResult<UpdateResult> {
        self.expect(UpdatePhase::Delegated, "finish")?;

        let (result, phase) = if self.failed_shards.is_empty() {
            (UpdateResult::Success, UpdatePhase::Committed)
        } else {
            (UpdateResult::Failed, UpdatePhase::Failed)
        };

        let resp = self
            .client
            .finish_update(role, job_name, result, Some(token.as_str()), session)?;
        // The token is spent whether or not the scheduler accepts the call.
        self.phase = phase;
        validate(&resp)?;
        Ok(result)
    }

    /// Terminate an update that some other invocation left in flight.
    pub fn cancel(&mut self, role: &str, job_name: &str, session: &SessionKey) -> ClientResult<()> {
        self.expect(UpdatePhase::Idle, "cancel")?;

        info!("Canceling update on job {job_name}");
        let resp = self
            .client
            .finish_update(role, job_name, UpdateResult::Terminate, None, session)?;
        self.phase = UpdatePhase::Terminated;
        validate(&resp)
    }

    fn expect(&self, phase: UpdatePhase, step: &str) -> ClientResult<()> {
        if self.phase != phase {
            return Err(ClientError::UpdateOrder(format!(
                "{step} requires phase {phase:?}, update is {:?}",
                self.phase
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use convoy_core::ResponseCode;

    use crate::clock::SystemClock;
    use crate::testing::{sample_job, session_key, Call, MockScheduler};

    /// Reports a fixed failed set and records the token it was bound to.
    struct StubUpdater {
        failed: BTreeSet<ShardId>,
    }

    impl ShardUpdater for StubUpdater {
        fn update(&mut self, _job: &JobDescriptor) -> BTreeSet<ShardId> {
            self.failed.clone()
        }
    }

    fn stub_factory(
        failed: &[ShardId],
        tokens: Rc<RefCell<Vec<String>>>,
    ) -> impl Fn(UpdateBinding) -> Box<dyn ShardUpdater> {
        let failed: BTreeSet<ShardId> = failed.iter().copied().collect();
        move |binding: UpdateBinding| {
            tokens.borrow_mut().push(binding.token.clone());
            Box::new(StubUpdater {
                failed: failed.clone(),
            }) as Box<dyn ShardUpdater>
        }
    }

    fn finish_calls(scheduler: &MockScheduler) -> Vec<(UpdateResult, Option<String>)> {
        scheduler
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::FinishUpdate { result, token, .. } => Some((result, token)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn empty_failed_set_commits_once() {
        let scheduler = Rc::new(MockScheduler::new().with_update_token("tok-7"));
        let tokens = Rc::new(RefCell::new(Vec::new()));
        let factory = stub_factory(&[], tokens.clone());
        let mut orchestrator =
            UpdateOrchestrator::new(scheduler.clone(), Rc::new(SystemClock), &factory);

        let outcome = orchestrator.run(&sample_job(), &session_key()).unwrap();

        assert_eq!(outcome, UpdateOutcome::Committed);
        assert_eq!(orchestrator.phase(), UpdatePhase::Committed);
        assert_eq!(
            finish_calls(&scheduler),
            vec![(UpdateResult::Success, Some("tok-7".to_string()))]
        );
        assert_eq!(*tokens.borrow(), vec!["tok-7".to_string()]);
        assert_eq!(
            scheduler.methods(),
            vec!["startUpdate", "finishUpdate"]
        );
    }

    #[test]
    fn failed_shards_close_as_failed_once() {
        let scheduler = Rc::new(MockScheduler::new().with_update_token("tok-8"));
        let factory = stub_factory(&[1, 3], Rc::default());
        let mut orchestrator =
            UpdateOrchestrator::new(scheduler.clone(), Rc::new(SystemClock), &factory);

        let outcome = orchestrator.run(&sample_job(), &session_key()).unwrap();

        assert_eq!(
            outcome,
            UpdateOutcome::RolledBack {
                failed_shards: [1, 3].into_iter().collect()
            }
        );
        assert_eq!(orchestrator.phase(), UpdatePhase::Failed);
        assert_eq!(
            finish_calls(&scheduler),
            vec![(UpdateResult::Failed, Some("tok-8".to_string()))]
        );
    }

    #[test]
    fn saga_never_terminates() {
        for failed in [vec![], vec![0]] {
            let scheduler = Rc::new(MockScheduler::new().with_update_token("tok"));
            let factory = stub_factory(&failed, Rc::default());
            let mut orchestrator =
                UpdateOrchestrator::new(scheduler.clone(), Rc::new(SystemClock), &factory);
            orchestrator.run(&sample_job(), &session_key()).unwrap();

            assert!(finish_calls(&scheduler)
                .iter()
                .all(|(result, _)| *result != UpdateResult::Terminate));
        }
    }

    #[test]
    fn rejected_start_stops_the_saga() {
        let scheduler = Rc::new(
            MockScheduler::new().reject("startUpdate", ResponseCode::InvalidRequest),
        );
        let tokens = Rc::new(RefCell::new(Vec::new()));
        let factory = stub_factory(&[], tokens.clone());
        let mut orchestrator =
            UpdateOrchestrator::new(scheduler.clone(), Rc::new(SystemClock), &factory);

        let err = orchestrator.run(&sample_job(), &session_key()).unwrap_err();

        assert!(matches!(err, ClientError::Rejected { code: ResponseCode::InvalidRequest, .. }));
        assert!(tokens.borrow().is_empty());
        assert!(finish_calls(&scheduler).is_empty());
        assert_eq!(orchestrator.phase(), UpdatePhase::Idle);
    }

    #[test]
    fn missing_token_is_an_error() {
        let scheduler = Rc::new(MockScheduler::new());
        let factory = stub_factory(&[], Rc::default());
        let mut orchestrator =
            UpdateOrchestrator::new(scheduler.clone(), Rc::new(SystemClock), &factory);

        let err = orchestrator.start_update(&sample_job(), &session_key()).unwrap_err();
        assert!(matches!(err, ClientError::MissingUpdateToken { .. }));
        assert!(err.to_string().contains("convoy cancel_update eng hello"));
    }

    #[test]
    fn rejected_finish_is_reported() {
        let scheduler = Rc::new(
            MockScheduler::new()
                .with_update_token("tok")
                .reject("finishUpdate", ResponseCode::Error),
        );
        let factory = stub_factory(&[2], Rc::default());
        let mut orchestrator =
            UpdateOrchestrator::new(scheduler.clone(), Rc::new(SystemClock), &factory);

        let err = orchestrator.run(&sample_job(), &session_key()).unwrap_err();
        assert!(matches!(err, ClientError::Rejected { code: ResponseCode::Error, .. }));
        assert_eq!(finish_calls(&scheduler).len(), 1);
    }

    #[test]
    fn steps_out_of_order_are_refused() {
        let scheduler = Rc::new(MockScheduler::new().with_update_token("tok"));
        let factory = stub_factory(&[], Rc::default());
        let mut orchestrator =
            UpdateOrchestrator::new(scheduler.clone(), Rc::new(SystemClock), &factory);
        let job = sample_job();
        let session = session_key();

        let stray = UpdateToken("stray".to_string());
        assert!(matches!(
            orchestrator.delegate(&job, &stray, &session),
            Err(ClientError::UpdateOrder(_))
        ));

        let token = orchestrator.start_update(&job, &session).unwrap();
        assert!(matches!(
            orchestrator.finish("eng", "hello", stray, &session),
            Err(ClientError::UpdateOrder(_))
        ));
        assert!(matches!(
            orchestrator.cancel("eng", "hello", &session),
            Err(ClientError::UpdateOrder(_))
        ));

        orchestrator.delegate(&job, &token, &session).unwrap();
        orchestrator.finish("eng", "hello", token, &session).unwrap();
        assert_eq!(scheduler.methods(), vec!["startUpdate", "finishUpdate"]);
    }

    #[test]
    fn cancel_terminates_without_token() {
        let scheduler = Rc::new(MockScheduler::new());
        let factory = stub_factory(&[], Rc::default());
        let mut orchestrator =
            UpdateOrchestrator::new(scheduler.clone(), Rc::new(SystemClock), &factory);

        orchestrator.cancel("eng", "hello", &session_key()).unwrap();

        assert_eq!(orchestrator.phase(), UpdatePhase::Terminated);
        assert_eq!(
            finish_calls(&scheduler),
            vec![(UpdateResult::Terminate, None)]
        );
    }

    #[test]
    fn rejected_cancel_is_reported() {
        let scheduler =
            Rc::new(MockScheduler::new().reject("finishUpdate", ResponseCode::InvalidRequest));
        let factory = stub_factory(&[], Rc::default());
        let mut orchestrator =
            UpdateOrchestrator::new(scheduler, Rc::new(SystemClock), &factory);

        assert!(orchestrator.cancel("eng", "hello", &session_key()).is_err());
    }
}
