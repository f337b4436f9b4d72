//! Artifact staging for `--copy_app_from`.
//!
//! Copies a local artifact into the cluster's artifact store. When the
//! cluster is reached through a tunnel host the file is first copied
//! there with `scp`, and every `hadoop fs` command runs on that host over
//! `ssh`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use convoy_core::ClusterRegistry;
use convoy_core::config::expand_home;

use crate::error::{ClientError, ClientResult};

/// A login on a remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLogin {
    pub user: String,
    pub host: String,
}

impl RemoteLogin {
    pub fn new(user: &str, host: &str) -> Self {
        Self {
            user: user.to_string(),
            host: host.to_string(),
        }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Runs shell commands locally or on a remote host.
pub trait ShellRunner {
    /// Run `cmd`; `Ok(true)` when it exited with status zero.
    fn run(&self, cmd: &[String], remote: Option<&RemoteLogin>) -> ClientResult<bool>;

    /// Copy `src` into the home directory of `remote`.
    fn upload(&self, src: &Path, remote: &RemoteLogin) -> ClientResult<()>;

    /// Like [`ShellRunner::run`], but a non-zero exit is an error.
    fn check(&self, cmd: &[String], remote: Option<&RemoteLogin>) -> ClientResult<()> {
        if self.run(cmd, remote)? {
            Ok(())
        } else {
            Err(ClientError::Staging(format!("command failed: {}", cmd.join(" "))))
        }
    }
}

/// [`ShellRunner`] that spawns real processes.
#[derive(Debug, Default)]
pub struct ProcessShellRunner;

impl ShellRunner for ProcessShellRunner {
    fn run(&self, cmd: &[String], remote: Option<&RemoteLogin>) -> ClientResult<bool> {
        let mut command = match remote {
            Some(login) => {
                let mut ssh = Command::new("ssh");
                ssh.arg(login.target()).arg(cmd.join(" "));
                ssh
            }
            None => {
                let (program, args) = cmd
                    .split_first()
                    .ok_or_else(|| ClientError::Staging("empty command".to_string()))?;
                let mut local = Command::new(program);
                local.args(args);
                local
            }
        };

        debug!(cmd = %cmd.join(" "), remote = ?remote.map(RemoteLogin::target), "running");
        let status = command
            .stdin(Stdio::null())
            .status()
            .map_err(|e| ClientError::Staging(format!("failed to execute {:?}: {e}", cmd)))?;
        Ok(status.success())
    }

    fn upload(&self, src: &Path, remote: &RemoteLogin) -> ClientResult<()> {
        let status = Command::new("scp")
            .arg(src)
            .arg(format!("{}:", remote.target()))
            .stdin(Stdio::null())
            .status()
            .map_err(|e| ClientError::Staging(format!("failed to execute 'scp': {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(ClientError::Staging(format!(
                "scp of {} to {} exited with {status}",
                src.display(),
                remote.target()
            )))
        }
    }
}

/// Artifact store URI for a job: the cluster's `artifact_root` followed
/// by the job's artifact path.
pub fn artifact_destination(
    registry: &ClusterRegistry,
    cluster: &str,
    artifact_path: Option<&str>,
) -> ClientResult<String> {
    let path = artifact_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ClientError::Staging("no target artifact path specified".to_string()))?;
    let root = registry
        .assert_exists(cluster)?
        .artifact_root
        .as_deref()
        .ok_or_else(|| {
            ClientError::Staging(format!("cluster {cluster} has no artifact store configured"))
        })?;
    Ok(format!("{root}{path}"))
}

pub struct ArtifactStager<'a> {
    runner: &'a dyn ShellRunner,
}

impl<'a> ArtifactStager<'a> {
    pub fn new(runner: &'a dyn ShellRunner) -> Self {
        Self { runner }
    }

    /// Copy the local file `source` to `destination`, replacing any file
    /// already there. Commands run on `proxy` when one is given.
    pub fn stage(
        &self,
        source: &str,
        destination: &str,
        proxy: Option<&RemoteLogin>,
    ) -> ClientResult<()> {
        let source = expand_home(source);
        if !source.exists() {
            return Err(ClientError::Staging(format!(
                "app file does not exist, cannot continue - {}",
                source.display()
            )));
        }

        // Through a proxy the file lands in the remote home directory.
        let put_source: PathBuf = match proxy {
            Some(login) => {
                info!("Running in corp, copy will be done via {}", login.target());
                self.runner.upload(&source, login)?;
                source
                    .file_name()
                    .map(PathBuf::from)
                    .ok_or_else(|| {
                        ClientError::Staging(format!("{} has no file name", source.display()))
                    })?
            }
            None => source.clone(),
        };

        if self.runner.run(&hadoop(&["-test", "-e", destination]), proxy)? {
            info!("Deleting existing file at {destination}");
            self.runner.check(&hadoop(&["-rm", destination]), proxy)?;
        } else {
            let parent = parent_dir(destination);
            if !self.runner.run(&hadoop(&["-test", "-e", parent]), proxy)? {
                info!("Creating directory {parent}");
                self.runner.check(&hadoop(&["-mkdir", parent]), proxy)?;
            }
        }

        let put_source = put_source.to_string_lossy();
        info!("Copying {put_source} -> {destination}");
        self.runner
            .check(&hadoop(&["-put", &*put_source, destination]), proxy)
    }
}

fn hadoop(args: &[&str]) -> Vec<String> {
    ["hadoop", "fs"]
        .iter()
        .chain(args)
        .map(|s| s.to_string())
        .collect()
}

fn parent_dir(uri: &str) -> &str {
    uri.rsplit_once('/').map_or(uri, |(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::fs;

    use crate::testing::test_registry;

    /// Records commands; `hadoop fs -test -e` succeeds only for `existing`.
    #[derive(Default)]
    struct RecordingRunner {
        existing: HashSet<String>,
        log: RefCell<Vec<String>>,
    }

    impl RecordingRunner {
        fn with_existing(paths: &[&str]) -> Self {
            Self {
                existing: paths.iter().map(|p| p.to_string()).collect(),
                ..Self::default()
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl ShellRunner for RecordingRunner {
        fn run(&self, cmd: &[String], remote: Option<&RemoteLogin>) -> ClientResult<bool> {
            let prefix = remote.map(|r| format!("[{}] ", r.target())).unwrap_or_default();
            self.log
                .borrow_mut()
                .push(format!("{prefix}{}", cmd.join(" ")));
            match cmd {
                [_, _, flag, _, path] if flag == "-test" => Ok(self.existing.contains(path)),
                _ => Ok(true),
            }
        }

        fn upload(&self, src: &Path, remote: &RemoteLogin) -> ClientResult<()> {
            let name = src.file_name().unwrap().to_string_lossy().into_owned();
            self.log
                .borrow_mut()
                .push(format!("scp {name} {}:", remote.target()));
            Ok(())
        }
    }

    const DEST: &str = "hdfs://nn.smf1:8020/apps/eng/hello.zip";
    const DEST_DIR: &str = "hdfs://nn.smf1:8020/apps/eng";

    fn artifact() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.zip");
        fs::write(&path, b"zip").unwrap();
        let path = path.to_string_lossy().into_owned();
        (dir, path)
    }

    #[test]
    fn destination_joins_root_and_path() {
        let dest = artifact_destination(&test_registry(), "smf1", Some("/apps/eng/hello.zip"));
        assert_eq!(dest.unwrap(), DEST);
    }

    #[test]
    fn destination_requires_path_and_root() {
        assert!(artifact_destination(&test_registry(), "smf1", None).is_err());
        assert!(artifact_destination(&test_registry(), "atla", Some("/a")).is_err());
        assert!(matches!(
            artifact_destination(&test_registry(), "mars", Some("/a")),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn missing_source_runs_nothing() {
        let runner = RecordingRunner::default();
        let err = ArtifactStager::new(&runner)
            .stage("/nonexistent/hello.zip", DEST, None)
            .unwrap_err();
        assert!(matches!(err, ClientError::Staging(_)));
        assert!(runner.log().is_empty());
    }

    #[test]
    fn existing_destination_is_replaced() {
        let (_dir, src) = artifact();
        let runner = RecordingRunner::with_existing(&[DEST]);

        ArtifactStager::new(&runner).stage(&src, DEST, None).unwrap();

        assert_eq!(
            runner.log(),
            vec![
                format!("hadoop fs -test -e {DEST}"),
                format!("hadoop fs -rm {DEST}"),
                format!("hadoop fs -put {src} {DEST}"),
            ]
        );
    }

    #[test]
    fn missing_parent_is_created() {
        let (_dir, src) = artifact();
        let runner = RecordingRunner::default();

        ArtifactStager::new(&runner).stage(&src, DEST, None).unwrap();

        assert_eq!(
            runner.log(),
            vec![
                format!("hadoop fs -test -e {DEST}"),
                format!("hadoop fs -test -e {DEST_DIR}"),
                format!("hadoop fs -mkdir {DEST_DIR}"),
                format!("hadoop fs -put {src} {DEST}"),
            ]
        );
    }

    #[test]
    fn proxy_uploads_then_runs_remotely() {
        let (_dir, src) = artifact();
        let runner = RecordingRunner::with_existing(&[DEST_DIR]);
        let proxy = RemoteLogin::new("eng", "nest1.smf1");

        ArtifactStager::new(&runner)
            .stage(&src, DEST, Some(&proxy))
            .unwrap();

        assert_eq!(
            runner.log(),
            vec![
                "scp hello.zip eng@nest1.smf1:".to_string(),
                format!("[eng@nest1.smf1] hadoop fs -test -e {DEST}"),
                format!("[eng@nest1.smf1] hadoop fs -test -e {DEST_DIR}"),
                format!("[eng@nest1.smf1] hadoop fs -put hello.zip {DEST}"),
            ]
        );
    }

    #[test]
    fn parent_of_uri() {
        assert_eq!(parent_dir(DEST), DEST_DIR);
        assert_eq!(parent_dir("plain"), "plain");
    }
}
