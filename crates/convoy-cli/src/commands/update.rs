//! `update` and `cancel_update`.

use std::rc::Rc;

use tracing::info;

use convoy_client::{
    RollingShardUpdater, ShardUpdater, UpdateBinding, UpdateOrchestrator, UpdateOutcome,
};

use super::Context;
use crate::{JobFileArgs, JobKeyArgs};

fn rolling_updater(binding: UpdateBinding) -> Box<dyn ShardUpdater> {
    Box::new(RollingShardUpdater::new(binding))
}

pub fn update(ctx: &mut Context, args: &JobFileArgs) -> anyhow::Result<()> {
    ctx.load_job(args)?;
    ctx.stage_artifact()?;

    let key = ctx.auth.acquire_session()?;
    let job = ctx.session.config()?.descriptor(&key.user);
    let client = ctx.session.client()?;

    let mut orchestrator = UpdateOrchestrator::new(client, Rc::clone(&ctx.clock), &rolling_updater);
    match orchestrator.run(&job, &key)? {
        UpdateOutcome::Committed => info!(job = %job.key(), "update committed"),
        UpdateOutcome::RolledBack { failed_shards } => {
            info!(job = %job.key(), failed = ?failed_shards, "update rolled back")
        }
    }
    Ok(())
}

pub fn cancel_update(ctx: &mut Context, args: &JobKeyArgs) -> anyhow::Result<()> {
    let key = ctx.auth.acquire_session()?;
    let client = ctx.session.client()?;

    let mut orchestrator = UpdateOrchestrator::new(client, Rc::clone(&ctx.clock), &rolling_updater);
    orchestrator.cancel(&args.role, &args.job, &key)?;
    Ok(())
}
