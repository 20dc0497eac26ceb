//! Single-flight execution of the update command.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use trigger::{HookConfig, RunId, RunOutcome, RunReport, Timestamp, UpdateTrigger};

use crate::{OutputCollector, RunnerError};

/// How long the drain step waits for the stderr copy to reach EOF after the
/// process is gone. A grandchild that inherited the pipe can keep it open
/// past its parent's exit; after this the copy is abandoned and whatever was
/// captured is reported.
const STDERR_EOF_GRACE: Duration = Duration::from_secs(2);

/// How long a killed command gets to be reaped before the run moves on.
const REAP_GRACE: Duration = Duration::from_secs(2);

/// Runs the update command, one run at a time.
///
/// Cloning is cheap; clones share the lock and the configuration.
#[derive(Debug, Clone)]
pub struct UpdateRunner {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: Arc<HookConfig>,
    // Held from spawn until the drain has finished. tokio's mutex hands the
    // lock to waiters in arrival order.
    lock: Mutex<()>,
}

impl UpdateRunner {
    /// Creates a runner for `config`.
    pub fn new(config: Arc<HookConfig>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                lock: Mutex::new(()),
            }),
        }
    }

    /// Launches one run on the tokio runtime and returns without waiting.
    ///
    /// The handle resolves to the run's report, or `None` if the command
    /// could not be spawned (already logged). Dropping the handle does not
    /// cancel the run.
    pub fn spawn_run(&self) -> JoinHandle<Option<RunReport>> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run_once().await.ok() })
    }

    /// Waits for the update lock, then performs one spawn-wait-or-kill cycle.
    pub async fn run_once(&self) -> Result<RunReport, RunnerError> {
        let _guard = self.inner.lock.lock().await;

        let run_id = RunId::new_random();
        let span = info_span!("update_run", %run_id);
        self.run_locked(run_id).instrument(span).await
    }

    async fn run_locked(&self, run_id: RunId) -> Result<RunReport, RunnerError> {
        let config = &self.inner.config;
        let started_at = Timestamp::now();

        let mut command = Command::new(&config.shell);
        command
            .arg("-c")
            .arg(config.command.as_str())
            .current_dir(&config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // The command leads its own process group so a kill reaches
        // everything it started, not just the shell.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                shell: config.shell.clone(),
                working_dir: config.working_dir.clone(),
                source,
            })
            .inspect_err(|e| error!(error = %e, "update not started"))?;

        let pid = child.id();
        info!(pid, command = %config.command, "update started");

        let collector = OutputCollector::new();
        let copy = child.stderr.take().map(|stderr| {
            let collector = collector.clone();
            tokio::spawn(async move {
                collector.copy_from(stderr).await;
            })
        });

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(config.timeout) => None,
        };

        let (outcome, stderr_lines) = match exited {
            Some(status) => {
                info!("update exited.");
                let stderr_lines = drain_when_copied(copy, &collector).await;
                let outcome = completed(status);
                if let RunOutcome::Completed {
                    error: Some(error), ..
                } = &outcome
                {
                    error!(%error, "update failed");
                }
                kill_leftovers(pid);
                (outcome, stderr_lines)
            }
            None => {
                let kill_error = kill_command(&mut child, pid).err();
                warn!(timeout_ms = config.timeout.as_millis() as u64, "update timed out.");
                if let Some(error) = &kill_error {
                    error!(%error, "failed to kill update command");
                }
                reap(&mut child).await;
                let stderr_lines = drain_when_copied(copy, &collector).await;
                (RunOutcome::TimedOut { kill_error }, stderr_lines)
            }
        };

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Timestamp::now(),
            outcome,
            stderr_lines,
        })
    }
}

impl UpdateTrigger for UpdateRunner {
    fn fire(&self) {
        drop(self.spawn_run());
    }
}

fn completed(status: io::Result<ExitStatus>) -> RunOutcome {
    match status {
        Ok(status) => RunOutcome::Completed {
            exit_code: status.code(),
            error: (!status.success()).then(|| status.to_string()),
        },
        Err(e) => RunOutcome::Completed {
            exit_code: None,
            error: Some(e.to_string()),
        },
    }
}

/// Collects the killed child's exit so it does not linger as a zombie. The
/// status itself is not reported.
async fn reap(child: &mut Child) {
    match tokio::time::timeout(REAP_GRACE, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "could not reap killed update command"),
        Err(_) => warn!("killed update command has not exited yet"),
    }
}

/// Sends SIGKILL to the command's whole process group.
#[cfg(unix)]
fn kill_command(_child: &mut Child, pid: Option<u32>) -> Result<(), String> {
    match pid {
        Some(pid) => kill_group(pid).map(|_| ()),
        None => Ok(()),
    }
}

/// Kills the shell only; there are no process groups to reach the rest.
#[cfg(not(unix))]
fn kill_command(child: &mut Child, _pid: Option<u32>) -> Result<(), String> {
    child.start_kill().map_err(|e| e.to_string())
}

/// Kills whatever the command left running in its process group after the
/// shell exited, so nothing from this run outlives the lock.
#[cfg(unix)]
fn kill_leftovers(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    match kill_group(pid) {
        Ok(true) => warn!("killed processes the update left running"),
        Ok(false) => {}
        Err(error) => error!(%error, "failed to kill processes the update left running"),
    }
}

#[cfg(not(unix))]
fn kill_leftovers(_pid: Option<u32>) {}

/// Returns `Ok(false)` when the group no longer has any members.
#[cfg(unix)]
fn kill_group(pid: u32) -> Result<bool, String> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid).map_err(|e| e.to_string())?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e.to_string()),
    }
}

/// Waits for the stderr copy task to finish, then drains the collector.
async fn drain_when_copied(copy: Option<JoinHandle<()>>, collector: &OutputCollector) -> usize {
    if let Some(mut handle) = copy {
        if tokio::time::timeout(STDERR_EOF_GRACE, &mut handle).await.is_err() {
            warn!("stderr still open after the update ended; reporting what was captured");
            handle.abort();
            let _ = handle.await;
        }
    }
    collector.drain()
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Instant;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tracing_test::traced_test;
    use trigger::{Secret, UpdateCommand};

    use super::*;

    fn runner_in(dir: &Path, command: &str, timeout: Duration) -> UpdateRunner {
        let mut config = HookConfig::new(Secret::new("s3cret"), dir);
        config.shell = "/bin/sh".into();
        config.command = UpdateCommand::new(command).unwrap();
        config.timeout = timeout;
        UpdateRunner::new(Arc::new(config))
    }

    fn scratch() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn successful_run_reports_exit_code_and_stderr() {
        let dir = scratch();
        let runner = runner_in(
            dir.path(),
            "echo 'Already up to date.' >&2",
            Duration::from_secs(5),
        );

        let report = runner.run_once().await.unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Completed {
                exit_code: Some(0),
                error: None
            }
        );
        assert_eq!(report.stderr_lines, 1);
        assert!(report.started_at <= report.finished_at);
        assert!(logs_contain("update started"));
        assert!(logs_contain("update exited."));
        assert!(logs_contain("update command stderr:"));
        assert!(logs_contain("Already up to date."));
        assert!(!logs_contain("update failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn command_runs_in_the_working_directory() {
        let dir = scratch();
        let runner = runner_in(dir.path(), "touch pulled", Duration::from_secs(5));

        let report = runner.run_once().await.unwrap();

        assert!(report.outcome.is_success());
        assert!(dir.path().join("pulled").exists());
        assert_eq!(report.stderr_lines, 0);
        assert!(!logs_contain("update command stderr:"));
    }

    #[tokio::test]
    #[traced_test]
    async fn non_zero_exit_is_completed_with_error() {
        let dir = scratch();
        let runner = runner_in(
            dir.path(),
            "printf 'fatal: refusing to merge\\nsecond line' >&2; exit 3",
            Duration::from_secs(5),
        );

        let report = runner.run_once().await.unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Completed {
                exit_code: Some(3),
                error: Some("exit status: 3".to_string())
            }
        );
        assert_eq!(report.stderr_lines, 2);
        assert!(logs_contain("update failed"));
        assert!(logs_contain("fatal: refusing to merge"));
        assert!(logs_contain("second line"));
    }

    #[tokio::test]
    #[traced_test]
    async fn slow_command_is_killed_on_timeout() {
        let dir = scratch();
        let runner = runner_in(
            dir.path(),
            "echo waiting >&2; sleep 0.5; touch finished",
            Duration::from_millis(50),
        );

        let start = Instant::now();
        let report = runner.run_once().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::TimedOut { kill_error: None });
        assert!(start.elapsed() < STDERR_EOF_GRACE + Duration::from_secs(1));
        assert!(logs_contain("update timed out."));
        assert!(logs_contain("waiting"));
        assert!(!logs_contain("update exited."));
        assert!(!logs_contain("update failed"));

        // The shell was killed before it could run the trailing command.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(!dir.path().join("finished").exists());
    }

    #[tokio::test]
    async fn overlapping_triggers_run_sequentially() {
        let dir = scratch();
        let runner = runner_in(
            dir.path(),
            "if [ -e running ]; then echo overlap >&2; exit 9; fi; \
             touch running; sleep 0.2; rm running",
            Duration::from_secs(5),
        );

        let (first, second) = tokio::join!(runner.run_once(), runner.run_once());
        let first = first.unwrap();
        let second = second.unwrap();

        assert!(first.outcome.is_success(), "{first:?}");
        assert!(second.outcome.is_success(), "{second:?}");
        assert!(!first.overlaps(&second));
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn every_spawned_run_executes() {
        let dir = scratch();
        let runner = runner_in(
            dir.path(),
            "echo run >> runs.log; sleep 0.05",
            Duration::from_secs(5),
        );

        let handles: Vec<_> = (0..3).map(|_| runner.spawn_run()).collect();
        let mut reports = Vec::new();
        for handle in handles {
            reports.push(handle.await.unwrap().unwrap());
        }

        let log = std::fs::read_to_string(dir.path().join("runs.log")).unwrap();
        assert_eq!(log.lines().count(), 3);
        for (i, a) in reports.iter().enumerate() {
            for b in &reports[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[tokio::test]
    async fn stderr_does_not_leak_into_the_next_run() {
        let dir = scratch();
        let runner = runner_in(
            dir.path(),
            "if [ -e second ]; then echo two >&2; else touch second; echo one >&2; echo more >&2; fi",
            Duration::from_secs(5),
        );

        let first = runner.run_once().await.unwrap();
        let second = runner.run_once().await.unwrap();

        assert_eq!(first.stderr_lines, 2);
        assert_eq!(second.stderr_lines, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn spawn_failure_aborts_the_run_and_releases_the_lock() {
        let dir = scratch();
        let mut config = HookConfig::new(Secret::new("s3cret"), dir.path());
        config.shell = "/nonexistent/shell".into();
        let runner = UpdateRunner::new(Arc::new(config));

        let err = runner.run_once().await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
        assert!(logs_contain("update not started"));

        // A second attempt is not blocked by the first.
        let second = tokio::time::timeout(Duration::from_secs(1), runner.run_once()).await;
        assert!(matches!(second, Ok(Err(RunnerError::Spawn { .. }))));
    }

    #[tokio::test]
    async fn missing_working_directory_is_a_spawn_failure() {
        let dir = scratch();
        let runner = runner_in(&dir.path().join("gone"), "true", Duration::from_secs(5));

        assert!(runner.spawn_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timed_out_run_leaves_nothing_running() {
        let dir = scratch();
        let runner = runner_in(
            dir.path(),
            "(sleep 1; echo orphan >> trace) 2>/dev/null & sleep 5 2>/dev/null",
            Duration::from_millis(50),
        );

        let report = runner.run_once().await.unwrap();
        assert!(report.outcome.is_timed_out());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("trace").exists());
    }

    #[tokio::test]
    #[traced_test]
    async fn finished_run_leaves_nothing_running() {
        let dir = scratch();
        let runner = runner_in(
            dir.path(),
            "(sleep 0.3; echo orphan >> trace) >/dev/null 2>&1 &",
            Duration::from_secs(5),
        );

        let report = runner.run_once().await.unwrap();
        assert!(report.outcome.is_success());
        assert!(logs_contain("killed processes the update left running"));

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(!dir.path().join("trace").exists());
    }

    #[tokio::test]
    #[traced_test]
    async fn stderr_held_open_after_exit_is_abandoned_after_grace() {
        let dir = scratch();
        let runner = runner_in(dir.path(), "sleep 5 & echo early >&2", Duration::from_secs(10));

        let start = Instant::now();
        let report = runner.run_once().await.unwrap();

        assert!(report.outcome.is_success(), "{report:?}");
        assert!(start.elapsed() >= STDERR_EOF_GRACE);
        assert!(start.elapsed() < STDERR_EOF_GRACE + Duration::from_secs(1));
        assert_eq!(report.stderr_lines, 1);
        assert!(logs_contain("stderr still open"));
        assert!(logs_contain("early"));
    }

    #[tokio::test]
    #[traced_test]
    async fn drain_reports_partial_output_when_the_pipe_never_closes() {
        let collector = OutputCollector::new();
        let (mut writer, reader) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"early\n")
            .await
            .unwrap();
        let copy = {
            let collector = collector.clone();
            tokio::spawn(async move {
                collector.copy_from(reader).await;
            })
        };

        let start = Instant::now();
        let lines = drain_when_copied(Some(copy), &collector).await;

        assert_eq!(lines, 1);
        assert!(start.elapsed() < STDERR_EOF_GRACE + Duration::from_secs(1));
        assert!(logs_contain("stderr still open"));
        assert!(logs_contain("early"));
        assert!(collector.is_empty());
        drop(writer);
    }
}
