//! High-level orchestration of start, stop, restart, and status.
//!
//! Every operation refreshes configuration once before acting. Fatal problems
//! surface as [`LifecycleError`]; recoverable ones go to the
//! [`LifecycleReporter`] and the operation carries on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use gridctl_catalog::{
    CatalogConnector, DialectAdapter, MigrationEngine, MigrationPlan, MigrationReport, Session,
    SystemScriptRunner,
};
use gridctl_config::{Config, ConfigSource, ConfigStore, VersionManifest};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::LIFECYCLE_TARGET;
use crate::error::{LifecycleError, LifecycleWarning};
use crate::poller::ConnectionPoller;
use crate::probe::probe_port;
use crate::process::{ProcessTable, SystemProcessTable};
use crate::reaper::{CacheReaper, SharedMemoryReaper};
use crate::reporter::{LifecycleReporter, StructuredLifecycleReporter};
use crate::shutdown::{
    CommandShutdownLauncher, EscalationReport, GracefulOutcome, ShutdownCoordinator,
    ShutdownLauncher, await_graceful,
};
use crate::spawning::{CommandServiceLauncher, ServiceLauncher};
use crate::state::ServiceState;

/// Poll intervals granted to force-killed processes before they count as survivors.
const KILL_SETTLE_POLLS: u32 = 10;

/// Outcome of a successful `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// Pid of the spawned primary process.
    pub pid: u32,
    /// Schema check result, present on catalog hosts.
    pub migration: Option<MigrationReport>,
    /// Connection attempt that succeeded.
    pub attempts: u32,
}

/// Outcome of a `stop` that did not fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Nothing was running when `stop` was called.
    pub already_stopped: bool,
    /// The graceful shutdown command exited successfully in time.
    pub graceful_completed: bool,
    /// Force-kill details, present when processes outlived the budget.
    pub escalation: Option<EscalationReport>,
    /// Pids still alive after escalation.
    pub survivors: Vec<u32>,
}

/// Managed binaries with live processes. Empty when nothing runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    processes: BTreeMap<Utf8PathBuf, Vec<u32>>,
}

impl StatusReport {
    /// Reports whether any managed process is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.processes.is_empty()
    }

    /// Pids running `binary`, if any.
    #[must_use]
    pub fn pids(&self, binary: &str) -> Option<&[u32]> {
        self.processes
            .iter()
            .find(|(path, _)| path.as_str() == binary)
            .map(|(_, pids)| pids.as_slice())
    }

    /// Binary to pids mapping.
    #[must_use]
    pub const fn processes(&self) -> &BTreeMap<Utf8PathBuf, Vec<u32>> {
        &self.processes
    }
}

/// Drives the managed service through its lifecycle.
pub struct ProcessController<S> {
    config: ConfigStore<S>,
    connector: Box<dyn CatalogConnector>,
    plan: MigrationPlan,
    processes: Box<dyn ProcessTable>,
    launcher: Box<dyn ServiceLauncher>,
    shutdown: Box<dyn ShutdownLauncher>,
    reaper: Option<Box<dyn CacheReaper>>,
    reporter: Arc<dyn LifecycleReporter>,
    state: ServiceState,
}

impl<S: ConfigSource> ProcessController<S> {
    /// Builds a controller using the real process table, `Command`-based
    /// launchers, shared-memory reaping, and tracing-backed reporting.
    pub fn new(source: S, connector: impl CatalogConnector + 'static) -> Self {
        Self {
            config: ConfigStore::new(source),
            connector: Box::new(connector),
            plan: MigrationPlan::catalog(),
            processes: Box::new(SystemProcessTable),
            launcher: Box::new(CommandServiceLauncher),
            shutdown: Box::new(CommandShutdownLauncher),
            reaper: None,
            reporter: Arc::new(StructuredLifecycleReporter::new()),
            state: ServiceState::Stopped,
        }
    }

    /// Replaces the migration plan.
    #[must_use]
    pub fn with_migration_plan(mut self, plan: MigrationPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Replaces the process table.
    #[must_use]
    pub fn with_process_table(mut self, processes: impl ProcessTable + 'static) -> Self {
        self.processes = Box::new(processes);
        self
    }

    /// Replaces the service launcher.
    #[must_use]
    pub fn with_service_launcher(mut self, launcher: impl ServiceLauncher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Replaces the graceful shutdown launcher.
    #[must_use]
    pub fn with_shutdown_launcher(mut self, shutdown: impl ShutdownLauncher + 'static) -> Self {
        self.shutdown = Box::new(shutdown);
        self
    }

    /// Replaces the reaper built from `shared_memory_dirs`.
    #[must_use]
    pub fn with_cache_reaper(mut self, reaper: impl CacheReaper + 'static) -> Self {
        self.reaper = Some(Box::new(reaper));
        self
    }

    /// Replaces the reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServiceState {
        self.state
    }

    /// Runs preflight checks, migrates the catalog on catalog hosts, spawns the
    /// primary service, and waits until it is reachable.
    ///
    /// # Errors
    ///
    /// Preflight failures leave the state untouched and spawn nothing. Later
    /// failures move the controller to [`ServiceState::Failed`]; after a
    /// startup timeout the spawned process is left running.
    pub fn start(&mut self) -> Result<StartReport, LifecycleError> {
        let result = self.try_start();
        self.report_failure("start", result.as_ref().err());
        result
    }

    /// Stops the service, escalating to force kills once `timeout` elapses.
    ///
    /// Stopping a service that is not running succeeds with
    /// [`StopReport::already_stopped`] set.
    ///
    /// # Errors
    ///
    /// Fails only when configuration or the process table cannot be read.
    pub fn stop(&mut self, timeout: Duration) -> Result<StopReport, LifecycleError> {
        let result = self.try_stop(Some(timeout));
        self.report_failure("stop", result.as_ref().err());
        result
    }

    /// Stops the service within the configured `shutdown_timeout_secs`.
    ///
    /// # Errors
    ///
    /// As for [`Self::stop`].
    pub fn stop_with_configured_timeout(&mut self) -> Result<StopReport, LifecycleError> {
        let result = self.try_stop(None);
        self.report_failure("stop", result.as_ref().err());
        result
    }

    /// Stops then starts the service. There is no rollback: if the start
    /// half fails the controller ends in [`ServiceState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns the first fatal error from either half.
    pub fn restart(&mut self, timeout: Duration) -> Result<StartReport, LifecycleError> {
        self.stop(timeout)?;
        self.start_after_stop()
    }

    /// [`Self::restart`] using the configured shutdown budget.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error from either half.
    pub fn restart_with_configured_timeout(&mut self) -> Result<StartReport, LifecycleError> {
        self.stop_with_configured_timeout()?;
        self.start_after_stop()
    }

    /// Lists live processes for every managed binary. Does not change state.
    ///
    /// # Errors
    ///
    /// Fails when configuration or the process table cannot be read.
    pub fn status(&mut self) -> Result<StatusReport, LifecycleError> {
        let result = self.try_status();
        self.report_failure("status", result.as_ref().err());
        result
    }

    fn start_after_stop(&mut self) -> Result<StartReport, LifecycleError> {
        let result = self.start();
        if result.is_err() {
            self.transition(ServiceState::Failed);
        }
        result
    }

    fn try_start(&mut self) -> Result<StartReport, LifecycleError> {
        let config = self.refresh_config()?;
        self.preflight(&config)?;
        self.transition(ServiceState::Starting);
        match self.launch(&config) {
            Ok(report) => {
                self.transition(ServiceState::Running);
                Ok(report)
            }
            Err(error) => {
                self.transition(ServiceState::Failed);
                Err(error)
            }
        }
    }

    fn preflight(&self, config: &Config) -> Result<(), LifecycleError> {
        let binary = config.server_binary().as_std_path();
        if !binary.is_file() {
            return Err(LifecycleError::MissingExecutable {
                path: binary.to_path_buf(),
            });
        }
        let log_directory = config.log_directory.as_std_path();
        NamedTempFile::new_in(log_directory)
            .and_then(NamedTempFile::close)
            .map_err(|source| LifecycleError::LogDirectoryUnwritable {
                path: log_directory.to_path_buf(),
                source,
            })?;
        for issue in config.validate() {
            self.reporter
                .warning(&LifecycleWarning::InvalidConfiguration(issue));
        }
        probe_port(config.service_port())
    }

    fn launch(&self, config: &Config) -> Result<StartReport, LifecycleError> {
        let (migration, environment) = if config.catalog_host {
            let settings = config.database();
            let adapter = DialectAdapter::new(settings.dialect);
            let environment = adapter.client_environment(&settings);
            let report = self.migrate_catalog(config, adapter)?;
            (Some(report), environment)
        } else {
            (None, Vec::new())
        };

        let binary = config.server_binary().as_std_path();
        let pid = self
            .launcher
            .spawn(binary, &environment)
            .map_err(|source| LifecycleError::Spawn {
                binary: binary.to_path_buf(),
                source,
            })?;
        info!(
            target: LIFECYCLE_TARGET,
            pid,
            binary = %binary.display(),
            port = config.service_port(),
            "spawned service; waiting for it to accept connections"
        );

        let attempts = ConnectionPoller::new(config.startup_attempts, config.startup_interval())
            .poll(config.service_port(), binary, self.processes.as_ref())?;
        Ok(StartReport {
            pid,
            migration,
            attempts,
        })
    }

    fn migrate_catalog(
        &self,
        config: &Config,
        adapter: DialectAdapter,
    ) -> Result<MigrationReport, LifecycleError> {
        let manifest = VersionManifest::read(&config.version_manifest)?;
        info!(
            target: LIFECYCLE_TARGET,
            software_version = %manifest.software_version,
            version = manifest.catalog_schema_version,
            dialect = %adapter.dialect(),
            "checking catalog schema"
        );
        let settings = config.database();
        self.connector.prepare(&settings)?;
        let mut session = Session::open_transactional(self.connector.as_ref(), &settings)?;
        let scripts = SystemScriptRunner::new(
            config.script_directory.as_std_path(),
            adapter,
            settings,
        );
        let engine = MigrationEngine::new(adapter, self.plan.clone(), Box::new(scripts));
        let report =
            engine.ensure_up_to_date(session.connection(), manifest.catalog_schema_version)?;
        if let Err(error) = session.close() {
            warn!(
                target: LIFECYCLE_TARGET,
                error = %error,
                "failed to close catalog connection after migration"
            );
        }
        self.reporter.migration_completed(&report);
        Ok(report)
    }

    fn try_stop(&mut self, timeout: Option<Duration>) -> Result<StopReport, LifecycleError> {
        let config = self.refresh_config()?;
        let deadline = Instant::now() + timeout.unwrap_or_else(|| config.shutdown_timeout());
        let primary = config.server_binary().as_std_path();
        if self.processes.pids_for(primary)?.is_empty() {
            self.reporter.warning(&LifecycleWarning::AlreadyStopped {
                binary: primary.to_path_buf(),
            });
            self.transition(ServiceState::Stopped);
            return Ok(StopReport {
                already_stopped: true,
                ..StopReport::default()
            });
        }

        self.transition(ServiceState::Stopping);
        let graceful = self.request_graceful_shutdown(&config, deadline);
        let mut report = StopReport {
            graceful_completed: graceful == GracefulOutcome::Completed,
            ..StopReport::default()
        };
        if self.wait_for_managed_exit(&config, deadline)? {
            info!(target: LIFECYCLE_TARGET, "service stopped cleanly");
            self.transition(ServiceState::Stopped);
            return Ok(report);
        }

        let escalation = self.escalate(&config)?;
        report.survivors.clone_from(&escalation.survivors);
        report.escalation = Some(escalation);
        if report.survivors.is_empty() {
            self.transition(ServiceState::Stopped);
        } else {
            self.transition(ServiceState::Failed);
        }
        Ok(report)
    }

    fn request_graceful_shutdown(&self, config: &Config, deadline: Instant) -> GracefulOutcome {
        let command = config.shutdown_command.as_std_path();
        match self.shutdown.launch(command, &config.host) {
            Ok(mut handle) => await_graceful(
                handle.as_mut(),
                command,
                deadline,
                config.shutdown_poll_interval(),
                self.reporter.as_ref(),
            ),
            Err(error) => {
                self.reporter
                    .warning(&LifecycleWarning::ShutdownCommandFailed {
                        command: command.to_path_buf(),
                        reason: error.to_string(),
                    });
                GracefulOutcome::Failed
            }
        }
    }

    /// Polls the process table until no managed binary is running or the
    /// deadline passes. Returns whether everything exited.
    fn wait_for_managed_exit(
        &self,
        config: &Config,
        deadline: Instant,
    ) -> Result<bool, LifecycleError> {
        loop {
            if self.running_processes(config)?.is_empty() {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(config.shutdown_poll_interval().min(deadline - now));
        }
    }

    fn escalate(&self, config: &Config) -> Result<EscalationReport, LifecycleError> {
        let primary = self
            .processes
            .pids_for(config.server_binary().as_std_path())?;
        let mut siblings = Vec::new();
        for binary in config.sibling_binaries() {
            siblings.extend(self.processes.pids_for(binary.as_std_path())?);
        }
        warn!(
            target: LIFECYCLE_TARGET,
            primary = ?primary,
            siblings = ?siblings,
            "graceful shutdown budget exhausted; force-killing managed processes"
        );

        let shared_memory;
        let reaper: &dyn CacheReaper = if let Some(reaper) = self.reaper.as_deref() {
            reaper
        } else {
            shared_memory = SharedMemoryReaper::new(config.shared_memory_dirs.clone());
            &shared_memory
        };
        let poll_interval = config.shutdown_poll_interval();
        let settle = poll_interval.saturating_mul(KILL_SETTLE_POLLS);
        let coordinator = ShutdownCoordinator::new(
            self.processes.as_ref(),
            reaper,
            self.reporter.as_ref(),
            poll_interval,
        );
        Ok(coordinator.escalate(&primary, &siblings, Instant::now() + settle))
    }

    fn try_status(&mut self) -> Result<StatusReport, LifecycleError> {
        let config = self.refresh_config()?;
        Ok(StatusReport {
            processes: self.running_processes(&config)?,
        })
    }

    fn running_processes(
        &self,
        config: &Config,
    ) -> Result<BTreeMap<Utf8PathBuf, Vec<u32>>, LifecycleError> {
        let mut running = BTreeMap::new();
        for binary in config.managed_binaries() {
            let pids = self.processes.pids_for(binary.as_std_path())?;
            if !pids.is_empty() {
                running.insert(binary.to_path_buf(), pids);
            }
        }
        Ok(running)
    }

    fn refresh_config(&mut self) -> Result<Config, LifecycleError> {
        self.config
            .refresh()
            .cloned()
            .map_err(LifecycleError::Configuration)
    }

    fn transition(&mut self, next: ServiceState) {
        if self.state != next {
            self.reporter.state_changed(self.state, next);
            self.state = next;
        }
    }

    fn report_failure(&self, operation: &'static str, error: Option<&LifecycleError>) {
        if let Some(error) = error {
            self.reporter.operation_failed(operation, error);
        }
    }
}

impl<S> std::fmt::Debug for ProcessController<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ProcessController")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
