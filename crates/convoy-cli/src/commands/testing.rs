//! Handler test fixtures: the client's mock scheduler behind a real router.

use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use convoy_client::testing::{FakeClock, FixedLocality, MockConnector, MockScheduler};
use convoy_client::{
    ClientResult, ConnectionRouter, Locality, ProcessShellRunner, RegistryTunnelLookup,
    SchedulerSession, SessionAuthenticator, SessionSigner,
};
use convoy_core::{ClusterRegistry, Quota, SessionKey};

use super::Context;
use crate::JobFileArgs;

/// Signs with a counter so every key differs.
#[derive(Default)]
struct CountingSigner(Cell<u32>);

impl SessionSigner for CountingSigner {
    fn sign(&self, key: &mut SessionKey, owner: &str) -> ClientResult<()> {
        let n = self.0.get() + 1;
        self.0.set(n);
        key.user = owner.to_string();
        key.nonce = format!("{n:08x}");
        key.issued_at = u64::from(n);
        key.signature = format!("signed-{n}");
        Ok(())
    }
}

pub struct Harness {
    pub ctx: Context,
    pub scheduler: Rc<MockScheduler>,
    pub connector: MockConnector,
    pub dir: tempfile::TempDir,
}

/// Scheduler that hands out update token `tok-1` and a 4 CPU quota.
pub fn scheduler() -> MockScheduler {
    MockScheduler::new().with_update_token("tok-1").with_quota(Quota {
        num_cpus: 4.0,
        ram_mb: 4096,
        disk_mb: 10240,
    })
}

pub fn context(cluster_arg: Option<&str>) -> Harness {
    context_with(cluster_arg, scheduler())
}

pub fn context_with(cluster_arg: Option<&str>, scheduler: MockScheduler) -> Harness {
    let registry = ClusterRegistry::default();
    let scheduler = Rc::new(scheduler);
    let connector = MockConnector::with_scheduler(Rc::clone(&scheduler));
    let router = ConnectionRouter::new(
        registry.clone(),
        Box::new(FixedLocality(Locality::Production)),
        Box::new(RegistryTunnelLookup::new(registry)),
        Box::new(connector.clone()),
    );

    let ctx = Context {
        session: SchedulerSession::new(router, cluster_arg.map(str::to_string)),
        auth: SessionAuthenticator::new(Box::new(CountingSigner::default())),
        runner: Box::new(ProcessShellRunner),
        clock: Rc::new(FakeClock::new()),
        copy_app_from: None,
        tunnel_as: None,
    };

    Harness {
        ctx,
        scheduler,
        connector,
        dir: tempfile::tempdir().unwrap(),
    }
}

/// Write `hello.toml` holding job `hello` (role `eng`, four instances)
/// and return the arguments naming it.
pub fn job_file(dir: &Path) -> JobFileArgs {
    let path = dir.join("hello.toml");
    fs::write(
        &path,
        r#"
[[jobs]]
name = "hello"
role = "eng"
instances = 4

[jobs.task]
num_cpus = 1.0
ram_mb = 512
disk_mb = 1024
start_command = "./hello"
artifact_path = "/apps/eng/hello.zip"

[jobs.update]
batch_size = 2
watch_secs = 0
"#,
    )
    .unwrap();
    JobFileArgs {
        job: "hello".to_string(),
        config: path,
    }
}
