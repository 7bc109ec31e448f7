//! Hand-written doubles for the OS seams used by controller tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use gridctl_catalog::MigrationReport;

use crate::error::{ErrorKind, LifecycleError, LifecycleWarning};
use crate::process::{KillError, KillOutcome, ProcessTable, ProcessTableError};
use crate::reporter::LifecycleReporter;
use crate::shutdown::{CommandExit, ShutdownHandle, ShutdownLauncher};
use crate::spawning::ServiceLauncher;
use crate::state::ServiceState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("test double lock poisoned")
}

/// Events observed by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reported {
    State(ServiceState, ServiceState),
    Warning(&'static str),
    Migration(MigrationReport),
    Killed(u32),
    Failed(&'static str, ErrorKind),
}

fn warning_label(warning: &LifecycleWarning) -> &'static str {
    match warning {
        LifecycleWarning::ShutdownTimeout { .. } => "shutdown_timeout",
        LifecycleWarning::ShutdownCommandFailed { .. } => "shutdown_command_failed",
        LifecycleWarning::KillFailed { .. } => "kill_failed",
        LifecycleWarning::CacheCleanup { .. } => "cache_cleanup",
        LifecycleWarning::InvalidConfiguration(_) => "invalid_configuration",
        LifecycleWarning::AlreadyStopped { .. } => "already_stopped",
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<Reported>>,
}

impl RecordingReporter {
    pub(crate) fn events(&self) -> Vec<Reported> {
        lock(&self.events).clone()
    }

    pub(crate) fn warnings(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Reported::Warning(label) => Some(label),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn killed(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Reported::Killed(pid) => Some(pid),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Reported) {
        lock(&self.events).push(event);
    }
}

impl LifecycleReporter for RecordingReporter {
    fn state_changed(&self, from: ServiceState, to: ServiceState) {
        self.push(Reported::State(from, to));
    }

    fn warning(&self, warning: &LifecycleWarning) {
        self.push(Reported::Warning(warning_label(warning)));
    }

    fn migration_completed(&self, report: &MigrationReport) {
        self.push(Reported::Migration(report.clone()));
    }

    fn process_killed(&self, pid: u32) {
        self.push(Reported::Killed(pid));
    }

    fn operation_failed(&self, operation: &'static str, error: &LifecycleError) {
        self.push(Reported::Failed(operation, error.kind()));
    }
}

#[derive(Debug, Default)]
struct ProcessState {
    running: BTreeMap<PathBuf, Vec<u32>>,
    kills: Vec<u32>,
    unkillable: BTreeSet<u32>,
}

/// In-memory process table. Killing a pid removes it unless marked unkillable.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeProcessTable {
    state: Arc<Mutex<ProcessState>>,
}

impl FakeProcessTable {
    pub(crate) fn run(&self, binary: impl AsRef<Path>, pids: &[u32]) {
        lock(&self.state)
            .running
            .entry(binary.as_ref().to_path_buf())
            .or_default()
            .extend_from_slice(pids);
    }

    pub(crate) fn exit_all(&self) {
        lock(&self.state).running.clear();
    }

    pub(crate) fn make_unkillable(&self, pid: u32) {
        lock(&self.state).unkillable.insert(pid);
    }

    pub(crate) fn kills(&self) -> Vec<u32> {
        lock(&self.state).kills.clone()
    }
}

impl ProcessTable for FakeProcessTable {
    fn pids_for(&self, binary: &Path) -> Result<Vec<u32>, ProcessTableError> {
        Ok(lock(&self.state)
            .running
            .get(binary)
            .cloned()
            .unwrap_or_default())
    }

    fn is_alive(&self, pid: u32) -> bool {
        lock(&self.state)
            .running
            .values()
            .any(|pids| pids.contains(&pid))
    }

    fn kill(&self, pid: u32) -> Result<KillOutcome, KillError> {
        if !self.is_alive(pid) {
            return Ok(KillOutcome::AlreadyExited);
        }
        let mut state = lock(&self.state);
        state.kills.push(pid);
        if !state.unkillable.contains(&pid) {
            for pids in state.running.values_mut() {
                pids.retain(|candidate| *candidate != pid);
            }
            state.running.retain(|_, pids| !pids.is_empty());
        }
        Ok(KillOutcome::Killed)
    }
}

#[derive(Debug, Default)]
struct LaunchState {
    spawns: Vec<(PathBuf, Vec<(String, String)>)>,
    listeners: Vec<TcpListener>,
}

/// Launcher that registers a fake pid and, optionally, starts listening on
/// the service port as the real service would.
#[derive(Debug, Clone)]
pub(crate) struct FakeServiceLauncher {
    processes: FakeProcessTable,
    listen_on: Option<u16>,
    pid: u32,
    state: Arc<Mutex<LaunchState>>,
}

impl FakeServiceLauncher {
    pub(crate) fn listening(processes: &FakeProcessTable, port: u16) -> Self {
        Self {
            processes: processes.clone(),
            listen_on: Some(port),
            pid: 4242,
            state: Arc::default(),
        }
    }

    pub(crate) fn silent(processes: &FakeProcessTable) -> Self {
        Self {
            processes: processes.clone(),
            listen_on: None,
            pid: 4242,
            state: Arc::default(),
        }
    }

    pub(crate) fn spawns(&self) -> Vec<(PathBuf, Vec<(String, String)>)> {
        lock(&self.state).spawns.clone()
    }
}

impl ServiceLauncher for FakeServiceLauncher {
    fn spawn(&self, binary: &Path, environment: &[(String, String)]) -> io::Result<u32> {
        let mut state = lock(&self.state);
        state
            .spawns
            .push((binary.to_path_buf(), environment.to_vec()));
        if let Some(port) = self.listen_on {
            state.listeners.push(TcpListener::bind(("127.0.0.1", port))?);
        }
        self.processes.run(binary, &[self.pid]);
        Ok(self.pid)
    }
}

/// How the fake graceful shutdown command behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownBehaviour {
    /// Every managed process exits and the command succeeds.
    Clean,
    /// The command never exits and the service keeps running.
    Hangs,
    /// The command never exits but the service exits anyway.
    HangsWhileServiceExits,
    /// The command cannot be launched.
    LaunchFails,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeShutdownLauncher {
    behaviour: ShutdownBehaviour,
    processes: FakeProcessTable,
    launches: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

impl FakeShutdownLauncher {
    pub(crate) fn new(behaviour: ShutdownBehaviour, processes: &FakeProcessTable) -> Self {
        Self {
            behaviour,
            processes: processes.clone(),
            launches: Arc::default(),
        }
    }

    pub(crate) fn launches(&self) -> Vec<(PathBuf, String)> {
        lock(&self.launches).clone()
    }
}

struct FakeHandle {
    exit: Option<CommandExit>,
}

impl ShutdownHandle for FakeHandle {
    fn try_wait(&mut self) -> io::Result<Option<CommandExit>> {
        Ok(self.exit)
    }

    fn kill(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ShutdownLauncher for FakeShutdownLauncher {
    fn launch(&self, command: &Path, host: &str) -> io::Result<Box<dyn ShutdownHandle>> {
        lock(&self.launches).push((command.to_path_buf(), host.to_owned()));
        let exit = match self.behaviour {
            ShutdownBehaviour::LaunchFails => {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no shutdown command"));
            }
            ShutdownBehaviour::Clean => {
                self.processes.exit_all();
                Some(CommandExit {
                    success: true,
                    code: Some(0),
                })
            }
            ShutdownBehaviour::Hangs => None,
            ShutdownBehaviour::HangsWhileServiceExits => {
                self.processes.exit_all();
                None
            }
        };
        Ok(Box::new(FakeHandle { exit }))
    }
}
