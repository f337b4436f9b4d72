use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use convoy_core::ClientConfig;

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(
    name = "convoy",
    about = "Convoy — command-line client for the cluster job scheduler",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Cluster to talk to: `<name>`, `<name>:<port>` or `localhost:<port>`
    #[arg(long, global = true)]
    pub cluster: Option<String>,

    /// Local path of the app artifact; it is copied to the cluster first
    #[arg(long = "copy_app_from", alias = "copy-app-from", global = true)]
    pub copy_app_from: Option<String>,

    /// User to tunnel as (defaults to the job role)
    #[arg(long = "tunnel_as", alias = "tunnel-as", global = true)]
    pub tunnel_as: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Minimum logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Client configuration file (default: $CONVOY_CONFIG, then ~/.convoy/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a job from a job configuration file
    Create(JobFileArgs),
    /// Parse a job configuration and show what would be submitted
    Inspect(JobFileArgs),
    /// Start a cron job immediately
    #[command(name = "start_cron", alias = "start-cron")]
    StartCron(JobKeyArgs),
    /// Kill all tasks of a job
    Kill(JobKeyArgs),
    /// Show the tasks of a job
    Status(JobKeyArgs),
    /// Update a running job to a new configuration, shard by shard
    Update(JobFileArgs),
    /// Terminate an update left in progress
    #[command(name = "cancel_update", alias = "cancel-update")]
    CancelUpdate(JobKeyArgs),
    /// Show the resource quota of a role
    #[command(name = "get_quota", alias = "get-quota")]
    GetQuota(RoleArgs),
    /// Set the resource quota of a role
    #[command(name = "set_quota", alias = "set-quota")]
    SetQuota(SetQuotaArgs),
}

/// `<job> <config>`: a job selected by name from a configuration file.
#[derive(Args, Debug, Clone)]
pub struct JobFileArgs {
    /// Job name inside the configuration file
    pub job: String,
    /// Job configuration file (TOML, or JSON with a `.json` extension)
    pub config: PathBuf,
}

/// `<role> <job>`: a job already known to the scheduler.
#[derive(Args, Debug, Clone)]
pub struct JobKeyArgs {
    pub role: String,
    pub job: String,
}

#[derive(Args, Debug, Clone)]
pub struct RoleArgs {
    pub role: String,
}

/// Values stay raw here; they are validated before anything is sent.
#[derive(Args, Debug, Clone)]
pub struct SetQuotaArgs {
    pub role: String,
    /// Number of CPUs (fractional allowed)
    pub cpu: String,
    /// RAM in MB
    pub ram_mb: String,
    /// Disk in MB
    pub disk_mb: String,
}

fn log_level(verbose: bool, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::ERROR
    } else if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

fn init_logging(global: &GlobalArgs) {
    // RUST_LOG wins over -v / -q.
    let filter = EnvFilter::builder()
        .with_default_directive(log_level(global.verbose, global.quiet).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn dispatch(command: Commands, ctx: &mut Context) -> anyhow::Result<()> {
    match command {
        Commands::Create(args) => commands::job::create(ctx, &args),
        Commands::Inspect(args) => commands::job::inspect(ctx, &args),
        Commands::StartCron(args) => commands::job::start_cron(ctx, &args),
        Commands::Kill(args) => commands::job::kill(ctx, &args),
        Commands::Status(args) => commands::job::status(ctx, &args),
        Commands::Update(args) => commands::update::update(ctx, &args),
        Commands::CancelUpdate(args) => commands::update::cancel_update(ctx, &args),
        Commands::GetQuota(args) => commands::quota::get_quota(ctx, &args),
        Commands::SetQuota(args) => commands::quota::set_quota(ctx, &args),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ClientConfig::load(cli.global.config.as_deref())
        .context("failed to load client configuration")?;
    let mut ctx = Context::from_config(&config, &cli.global);
    dispatch(cli.command, &mut ctx)
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global);

    if let Err(e) = run(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}
