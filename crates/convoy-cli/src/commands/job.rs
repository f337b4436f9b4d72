//! `create`, `inspect`, `start_cron`, `kill` and `status`.

use tracing::info;

use convoy_client::{TaskStatusReporter, validate};
use convoy_core::TaskQuery;

use super::Context;
use crate::{JobFileArgs, JobKeyArgs};

pub fn create(ctx: &mut Context, args: &JobFileArgs) -> anyhow::Result<()> {
    ctx.load_job(args)?;
    ctx.stage_artifact()?;

    let key = ctx.auth.acquire_session()?;
    let job = ctx.session.config()?.descriptor(&key.user);

    info!("Creating job {}", job.name);
    let client = ctx.session.client()?;
    validate(&client.create_job(&job, &key)?)?;
    Ok(())
}

/// Show the parsed job. Talks to no scheduler unless `--copy_app_from`
/// asks where the artifact would go.
pub fn inspect(ctx: &mut Context, args: &JobFileArgs) -> anyhow::Result<()> {
    info!("Inspecting job {} in {}", args.job, args.config.display());
    ctx.load_job(args)?;

    if ctx.copy_app_from.is_some() {
        if let Some(path) = ctx.session.config()?.artifact_path().map(str::to_string) {
            info!("Detected artifact: {path}");
            let cluster = ctx.session.cluster()?;
            let proxy = ctx.session.tunnel_proxy()?;
            info!(
                "Would copy to {cluster} via {}.",
                proxy.as_deref().unwrap_or("a direct connection")
            );
        }
    }

    let key = ctx.auth.acquire_session()?;
    let job = ctx.session.config()?.descriptor(&key.user);
    info!("Parsed job: {}", job.key());
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

pub fn start_cron(ctx: &mut Context, args: &JobKeyArgs) -> anyhow::Result<()> {
    let key = ctx.auth.acquire_session()?;
    let client = ctx.session.client()?;
    validate(&client.start_cron_job(&args.role, &args.job, &key)?)?;
    Ok(())
}

pub fn kill(ctx: &mut Context, args: &JobKeyArgs) -> anyhow::Result<()> {
    info!("Killing tasks");
    let key = ctx.auth.acquire_session()?;
    let client = ctx.session.client()?;
    validate(&client.kill_tasks(&TaskQuery::job(&args.role, &args.job), &key)?)?;
    Ok(())
}

pub fn status(ctx: &mut Context, args: &JobKeyArgs) -> anyhow::Result<()> {
    info!("Fetching tasks status");
    let client = ctx.session.client()?;
    let report = TaskStatusReporter::new(client.as_ref()).report(&args.role, &args.job)?;
    println!("{report}");
    Ok(())
}
