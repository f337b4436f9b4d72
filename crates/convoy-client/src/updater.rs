//! Rolling shard updater.
//!
//! Restarts shards batch by batch on the staged configuration and watches
//! each batch until its shards have stayed RUNNING for `watch_secs`.
//! Unhealthy shards are retried up to `max_per_shard_failures` times.
//! Once more than `max_total_failures` shards have failed, every shard
//! touched so far is rolled back and the failed set is reported.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, warn};

use convoy_core::{JobDescriptor, ScheduleStatus, ScheduledTask, SessionKey, ShardId, TaskQuery};

use crate::api::SchedulerApi;
use crate::clock::Clock;
use crate::error::ClientResult;
use crate::update::{ShardUpdater, UpdateBinding};
use crate::validate::{checked, validate};

/// Delay between two task status polls while a batch is watched.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct RollingShardUpdater {
    client: Rc<dyn SchedulerApi>,
    clock: Rc<dyn Clock>,
    token: String,
    session: SessionKey,
    poll_interval: Duration,
}

impl RollingShardUpdater {
    pub fn new(binding: UpdateBinding) -> Self {
        Self {
            client: binding.client,
            clock: binding.clock,
            token: binding.token,
            session: binding.session,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Restart `batch` and watch it. Returns the shards that did not
    /// become healthy in time.
    fn restart_and_watch(
        &self,
        job: &JobDescriptor,
        batch: &[ShardId],
    ) -> ClientResult<BTreeSet<ShardId>> {
        let role = &job.owner.role;
        info!(job = %job.key(), shards = ?batch, "restarting shards");
        let resp =
            self.client
                .restart_shards(role, &job.name, batch, &self.token, &self.session)?;
        validate(&resp)?;

        let settings = &job.update;
        let watch = Duration::from_secs(settings.watch_secs);
        let deadline =
            self.clock.now() + Duration::from_secs(settings.restart_threshold_secs) + watch;

        let mut pending: BTreeSet<ShardId> = batch.iter().copied().collect();
        let mut unhealthy = BTreeSet::new();
        let mut running_since: BTreeMap<ShardId, Duration> = BTreeMap::new();

        loop {
            let query = TaskQuery {
                shard_ids: Some(pending.iter().copied().collect()),
                ..TaskQuery::job(role, &job.name)
            };
            let tasks = checked(self.client.get_tasks_status(&query)?)?.tasks;
            let now = self.clock.now();

            for shard in pending.clone() {
                match current_status(&tasks, shard) {
                    Some(ScheduleStatus::Running) => {
                        let since = *running_since.entry(shard).or_insert(now);
                        if now.saturating_sub(since) >= watch {
                            debug!(shard, "shard healthy");
                            pending.remove(&shard);
                        }
                    }
                    Some(status) if status.is_terminal() => {
                        warn!(shard, status = status.name(), "shard failed to restart");
                        pending.remove(&shard);
                        unhealthy.insert(shard);
                    }
                    _ => {
                        running_since.remove(&shard);
                    }
                }
            }

            if pending.is_empty() {
                break;
            }
            if now >= deadline {
                warn!(shards = ?pending, "shards did not become healthy in time");
                unhealthy.append(&mut pending);
                break;
            }
            self.clock.sleep(self.poll_interval);
        }

        Ok(unhealthy)
    }

    fn rollback(&self, job: &JobDescriptor, shards: &BTreeSet<ShardId>) {
        let shards: Vec<ShardId> = shards.iter().copied().collect();
        info!(job = %job.key(), shards = ?shards, "rolling back shards");
        let result = self
            .client
            .rollback_shards(&job.owner.role, &job.name, &shards, &self.token, &self.session)
            .and_then(|resp| validate(&resp));
        if let Err(e) = result {
            warn!(job = %job.key(), error = %e, "rollback failed");
        }
    }
}

impl ShardUpdater for RollingShardUpdater {
    fn update(&mut self, job: &JobDescriptor) -> BTreeSet<ShardId> {
        let settings = &job.update;
        let batch_size = settings.batch_size.max(1) as usize;

        let mut queue: VecDeque<ShardId> = job.shard_ids().into();
        let mut touched = BTreeSet::new();
        let mut failures: BTreeMap<ShardId, u32> = BTreeMap::new();
        let mut failed = BTreeSet::new();

        while !queue.is_empty() {
            let batch: Vec<ShardId> = queue.drain(..batch_size.min(queue.len())).collect();
            touched.extend(batch.iter().copied());

            let unhealthy = match self.restart_and_watch(job, &batch) {
                Ok(unhealthy) => unhealthy,
                Err(e) => {
                    warn!(job = %job.key(), shards = ?batch, error = %e, "batch restart failed");
                    batch.iter().copied().collect()
                }
            };

            for shard in unhealthy {
                let count = failures.entry(shard).or_default();
                *count += 1;
                if *count > settings.max_per_shard_failures {
                    failed.insert(shard);
                } else {
                    debug!(shard, attempt = *count, "retrying shard");
                    queue.push_back(shard);
                }
            }

            if failed.len() > settings.max_total_failures as usize {
                warn!(
                    job = %job.key(),
                    failed = ?failed,
                    "too many failed shards, rolling back"
                );
                self.rollback(job, &touched);
                return failed;
            }
        }

        if !failed.is_empty() {
            warn!(
                job = %job.key(),
                failed = ?failed,
                "shards failed to update, within tolerated failures"
            );
        }
        BTreeSet::new()
    }
}

/// Status of `shard`, preferring an active task over finished ones.
fn current_status(tasks: &[ScheduledTask], shard: ShardId) -> Option<ScheduleStatus> {
    let mut last = None;
    for task in tasks.iter().filter(|t| t.shard_id == shard) {
        if task.status.is_active() {
            return Some(task.status);
        }
        last = Some(task.status);
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::{ResponseCode, UpdateSettings};

    use crate::testing::{sample_job, scheduled_task, session_key, Call, FakeClock, MockScheduler};

    fn job(instances: u32, update: UpdateSettings) -> JobDescriptor {
        JobDescriptor {
            instances,
            update,
            ..sample_job()
        }
    }

    fn settings(batch_size: u32, max_per_shard: u32, max_total: u32) -> UpdateSettings {
        UpdateSettings {
            batch_size,
            restart_threshold_secs: 60,
            watch_secs: 30,
            max_per_shard_failures: max_per_shard,
            max_total_failures: max_total,
        }
    }

    fn updater(scheduler: &Rc<MockScheduler>, clock: &Rc<FakeClock>) -> RollingShardUpdater {
        RollingShardUpdater::new(UpdateBinding {
            client: scheduler.clone(),
            clock: clock.clone(),
            token: "tok".to_string(),
            session: session_key(),
        })
    }

    fn restarts(scheduler: &MockScheduler) -> Vec<Vec<ShardId>> {
        scheduler
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RestartShards { shards, token } => {
                    assert_eq!(token, "tok");
                    Some(shards)
                }
                _ => None,
            })
            .collect()
    }

    fn rollbacks(scheduler: &MockScheduler) -> Vec<Vec<ShardId>> {
        scheduler
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RollbackShards { shards, .. } => Some(shards),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn healthy_update_restarts_in_batches() {
        let scheduler = Rc::new(MockScheduler::new());
        let clock = Rc::new(FakeClock::new());

        let failed = updater(&scheduler, &clock).update(&job(5, settings(2, 0, 0)));

        assert!(failed.is_empty());
        assert_eq!(restarts(&scheduler), vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert!(rollbacks(&scheduler).is_empty());
        // Every batch is watched for the full watch window.
        assert!(clock.elapsed() >= Duration::from_secs(3 * 30));
    }

    #[test]
    fn too_many_failures_roll_back_touched_shards() {
        let scheduler = Rc::new(
            MockScheduler::new().with_restart_outcomes(3, &[ScheduleStatus::Failed]),
        );
        let clock = Rc::new(FakeClock::new());

        let failed = updater(&scheduler, &clock).update(&job(6, settings(2, 0, 0)));

        assert_eq!(failed, BTreeSet::from([3]));
        assert_eq!(restarts(&scheduler), vec![vec![0, 1], vec![2, 3]]);
        assert_eq!(rollbacks(&scheduler), vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn unhealthy_shard_is_retried() {
        let scheduler = Rc::new(MockScheduler::new().with_restart_outcomes(
            1,
            &[ScheduleStatus::Failed, ScheduleStatus::Running],
        ));
        let clock = Rc::new(FakeClock::new());

        let failed = updater(&scheduler, &clock).update(&job(3, settings(2, 1, 0)));

        assert!(failed.is_empty());
        assert_eq!(restarts(&scheduler), vec![vec![0, 1], vec![2, 1]]);
        assert!(rollbacks(&scheduler).is_empty());
    }

    #[test]
    fn tolerated_failures_report_nothing() {
        let scheduler = Rc::new(
            MockScheduler::new().with_restart_outcomes(0, &[ScheduleStatus::Lost]),
        );
        let clock = Rc::new(FakeClock::new());

        let failed = updater(&scheduler, &clock).update(&job(3, settings(3, 0, 1)));

        assert!(failed.is_empty());
        assert!(rollbacks(&scheduler).is_empty());
    }

    #[test]
    fn stuck_shard_times_out() {
        let scheduler = Rc::new(
            MockScheduler::new().with_restart_outcomes(0, &[ScheduleStatus::Pending]),
        );
        let clock = Rc::new(FakeClock::new());

        let failed = updater(&scheduler, &clock)
            .with_poll_interval(Duration::from_secs(10))
            .update(&job(1, settings(1, 0, 0)));

        assert_eq!(failed, BTreeSet::from([0]));
        assert!(clock.elapsed() >= Duration::from_secs(60 + 30));
        assert_eq!(rollbacks(&scheduler), vec![vec![0]]);
    }

    #[test]
    fn rejected_restart_fails_the_batch() {
        let scheduler = Rc::new(
            MockScheduler::new().reject("restartShards", ResponseCode::Error),
        );
        let clock = Rc::new(FakeClock::new());

        let failed = updater(&scheduler, &clock).update(&job(2, settings(2, 0, 0)));

        assert_eq!(failed, BTreeSet::from([0, 1]));
        assert_eq!(scheduler.count("getTasksStatus"), 0);
        assert_eq!(rollbacks(&scheduler), vec![vec![0, 1]]);
    }

    #[test]
    fn active_task_wins_over_finished_one() {
        let tasks = vec![
            scheduled_task(0, ScheduleStatus::Killed, Some("a")),
            scheduled_task(0, ScheduleStatus::Starting, Some("b")),
            scheduled_task(1, ScheduleStatus::Finished, Some("c")),
        ];
        assert_eq!(current_status(&tasks, 0), Some(ScheduleStatus::Starting));
        assert_eq!(current_status(&tasks, 1), Some(ScheduleStatus::Finished));
        assert_eq!(current_status(&tasks, 2), None);
    }
}
