//! Graceful shutdown command handling and force-kill escalation.
//!
//! The graceful path asks the service to stop itself through an external
//! command. When the service outlives its budget the [`ShutdownCoordinator`]
//! kills whatever is left, primary processes first so they cannot spawn new
//! children, and reaps each killed pid's cache files before moving on.

use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::SHUTDOWN_TARGET;
use crate::error::LifecycleWarning;
use crate::process::{KillOutcome, ProcessTable};
use crate::reaper::CacheReaper;
use crate::reporter::LifecycleReporter;

/// Exit of the graceful shutdown command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandExit {
    /// Whether the command reported success.
    pub success: bool,
    /// Exit code, when it exited normally.
    pub code: Option<i32>,
}

/// A running graceful shutdown command.
#[cfg_attr(test, mockall::automock)]
pub trait ShutdownHandle {
    /// Returns the exit if the command has finished, without blocking.
    fn try_wait(&mut self) -> io::Result<Option<CommandExit>>;

    /// Kills the command itself.
    fn kill(&mut self) -> io::Result<()>;
}

/// Launches the graceful shutdown command without waiting for it.
#[cfg_attr(test, mockall::automock)]
pub trait ShutdownLauncher {
    /// Starts `command` with `host` as its final argument.
    fn launch(&self, command: &Path, host: &str) -> io::Result<Box<dyn ShutdownHandle>>;
}

/// Launcher backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandShutdownLauncher;

impl ShutdownLauncher for CommandShutdownLauncher {
    fn launch(&self, command: &Path, host: &str) -> io::Result<Box<dyn ShutdownHandle>> {
        let child = Command::new(command)
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()?;
        Ok(Box::new(ChildHandle { child }))
    }
}

struct ChildHandle {
    child: Child,
}

impl ShutdownHandle for ChildHandle {
    fn try_wait(&mut self) -> io::Result<Option<CommandExit>> {
        Ok(self.child.try_wait()?.map(|status| CommandExit {
            success: status.success(),
            code: status.code(),
        }))
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()?;
        // Reap so the killed command does not linger as a zombie.
        self.child.wait().map(|_| ())
    }
}

/// Outcome of waiting on the graceful shutdown command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracefulOutcome {
    /// The command exited successfully before the deadline.
    Completed,
    /// The command exited unsuccessfully or could not be launched.
    Failed,
    /// The deadline passed; the command was killed.
    TimedOut,
}

/// Polls `handle` until it exits or `deadline` passes, killing it on timeout.
///
/// Problems are reported as warnings; none of them are fatal.
pub fn await_graceful(
    handle: &mut dyn ShutdownHandle,
    command: &Path,
    deadline: Instant,
    poll_interval: Duration,
    reporter: &dyn LifecycleReporter,
) -> GracefulOutcome {
    let started = Instant::now();
    loop {
        match handle.try_wait() {
            Ok(Some(exit)) if exit.success => return GracefulOutcome::Completed,
            Ok(Some(exit)) => {
                reporter.warning(&LifecycleWarning::ShutdownCommandFailed {
                    command: command.to_path_buf(),
                    reason: format!("exited with status {:?}", exit.code),
                });
                return GracefulOutcome::Failed;
            }
            Ok(None) => {}
            Err(error) => {
                reporter.warning(&LifecycleWarning::ShutdownCommandFailed {
                    command: command.to_path_buf(),
                    reason: error.to_string(),
                });
                return GracefulOutcome::Failed;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
    if let Err(error) = handle.kill() {
        debug!(
            target: SHUTDOWN_TARGET,
            error = %error,
            "failed to kill hung shutdown command"
        );
    }
    reporter.warning(&LifecycleWarning::ShutdownTimeout {
        command: command.to_path_buf(),
        timeout: deadline.saturating_duration_since(started),
    });
    GracefulOutcome::TimedOut
}

/// Polls until every pid in `pids` has exited or `deadline` passes.
///
/// Returns the pids still alive, in input order.
pub fn wait_for_exit(
    processes: &dyn ProcessTable,
    pids: &[u32],
    deadline: Instant,
    poll_interval: Duration,
) -> Vec<u32> {
    loop {
        let alive: Vec<u32> = pids
            .iter()
            .copied()
            .filter(|pid| processes.is_alive(*pid))
            .collect();
        let now = Instant::now();
        if alive.is_empty() || now >= deadline {
            return alive;
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}

/// Result of a force-kill escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationReport {
    /// Pids that received `SIGKILL`, in kill order.
    pub killed: Vec<u32>,
    /// Pids that had exited before they could be killed. Informational only.
    pub already_exited: Vec<u32>,
    /// Pids still alive at the deadline, including any whose kill failed.
    pub survivors: Vec<u32>,
}

/// Force-kills managed processes that outlived the graceful shutdown.
pub struct ShutdownCoordinator<'a> {
    processes: &'a dyn ProcessTable,
    reaper: &'a dyn CacheReaper,
    reporter: &'a dyn LifecycleReporter,
    poll_interval: Duration,
}

impl<'a> ShutdownCoordinator<'a> {
    /// Builds a coordinator over the given collaborators.
    #[must_use]
    pub fn new(
        processes: &'a dyn ProcessTable,
        reaper: &'a dyn CacheReaper,
        reporter: &'a dyn LifecycleReporter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            processes,
            reaper,
            reporter,
            poll_interval,
        }
    }

    /// Kills `primary` pids, then `sibling` pids, reaping cache files for each
    /// pid actually killed before moving to the next one. Then waits until
    /// `deadline` for the killed pids to disappear.
    #[must_use]
    pub fn escalate(&self, primary: &[u32], sibling: &[u32], deadline: Instant) -> EscalationReport {
        let mut report = EscalationReport::default();
        let mut failed = Vec::new();
        for &pid in primary.iter().chain(sibling) {
            match self.processes.kill(pid) {
                Ok(KillOutcome::Killed) => {
                    self.reporter.process_killed(pid);
                    self.reap(pid);
                    report.killed.push(pid);
                }
                Ok(KillOutcome::AlreadyExited) => {
                    debug!(target: SHUTDOWN_TARGET, pid, "process exited before kill");
                    report.already_exited.push(pid);
                }
                Err(error) => {
                    self.reporter.warning(&LifecycleWarning::KillFailed {
                        pid: error.pid,
                        reason: error.reason,
                    });
                    failed.push(pid);
                }
            }
        }
        let mut watched = report.killed.clone();
        watched.extend(failed);
        report.survivors = wait_for_exit(self.processes, &watched, deadline, self.poll_interval);
        info!(
            target: SHUTDOWN_TARGET,
            killed = ?report.killed,
            already_exited = ?report.already_exited,
            survivors = ?report.survivors,
            "escalation finished"
        );
        report
    }

    fn reap(&self, pid: u32) {
        let outcome = self.reaper.reap(pid);
        for warning in &outcome.warnings {
            self.reporter.warning(warning);
        }
    }
}
