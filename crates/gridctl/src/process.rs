//! Observing and force-killing managed processes through the OS process table.
//!
//! The controller never owns the processes it manages. It finds them by
//! comparing each process's on-disk executable with a configured absolute
//! path, exact match only.

use std::path::Path;

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use thiserror::Error;

/// Result of a force kill that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// `SIGKILL` was delivered.
    Killed,
    /// The process had already exited.
    AlreadyExited,
}

/// A force kill that failed for a reason other than the process having exited.
#[derive(Debug, Error)]
#[error("failed to kill pid {pid}: {reason}")]
pub struct KillError {
    /// Target process.
    pub pid: u32,
    /// OS-level reason.
    pub reason: String,
}

/// The process table could not be enumerated.
#[derive(Debug, Error)]
pub enum ProcessTableError {
    /// Process enumeration is not supported on this platform.
    #[error("process enumeration is not supported on this platform")]
    Unsupported,
}

/// Process-table operations used by the controller and shutdown coordinator.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable {
    /// Pids of live processes executing exactly `binary`, in ascending order.
    fn pids_for(&self, binary: &Path) -> Result<Vec<u32>, ProcessTableError>;

    /// Reports whether `pid` is still a live (non-zombie) process.
    fn is_alive(&self, pid: u32) -> bool;

    /// Sends `SIGKILL` to `pid`.
    fn kill(&self, pid: u32) -> Result<KillOutcome, KillError>;
}

/// Process table backed by `sysinfo` enumeration and `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn pids_for(&self, binary: &Path) -> Result<Vec<u32>, ProcessTableError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProcessTableError::Unsupported);
        }
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, process)| process.status() != ProcessStatus::Zombie)
            .filter(|(_, process)| process.exe() == Some(binary))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn is_alive(&self, pid: u32) -> bool {
        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        system
            .process(target)
            .is_some_and(|process| process.status() != ProcessStatus::Zombie)
    }

    fn kill(&self, pid: u32) -> Result<KillOutcome, KillError> {
        send_sigkill(pid)
    }
}

#[cfg(unix)]
fn send_sigkill(pid: u32) -> Result<KillOutcome, KillError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid as UnixPid;

    let raw = i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| KillError {
            pid,
            reason: String::from("pid is outside the signalable range"),
        })?;
    match kill(UnixPid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => Ok(KillOutcome::Killed),
        Err(Errno::ESRCH) => Ok(KillOutcome::AlreadyExited),
        Err(errno) => Err(KillError {
            pid,
            reason: errno.desc().to_owned(),
        }),
    }
}

#[cfg(not(unix))]
fn send_sigkill(pid: u32) -> Result<KillOutcome, KillError> {
    Err(KillError {
        pid,
        reason: String::from("signalling is not supported on this platform"),
    })
}
