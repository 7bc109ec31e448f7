use camino::Utf8PathBuf;

use crate::dialect::Dialect;
use crate::logging::LogFormat;

/// Default TCP port the managed service listens on.
pub const DEFAULT_SERVICE_PORT: u16 = 1247;

/// Default log filter: lifecycle and migration events at `info`, everything
/// else (driver and OS helper crates) only when it warns.
pub const DEFAULT_LOG_FILTER: &str = "warn,gridctl=info,gridctl_catalog=info";

/// Installation prefix holding the managed binaries.
pub const DEFAULT_INSTALL_PREFIX: &str = "/usr/sbin";

/// Number of connection attempts made after spawning the service.
pub const DEFAULT_STARTUP_ATTEMPTS: u32 = 20;

/// Delay between connection attempts, in milliseconds.
pub const DEFAULT_STARTUP_INTERVAL_MS: u64 = 500;

/// Total shutdown budget, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 20;

/// Delay between process-table polls while waiting for shutdown.
pub const DEFAULT_SHUTDOWN_POLL_MS: u64 = 300;

/// Well-known shared-memory directories scanned for cache artefacts.
pub const DEFAULT_SHARED_MEMORY_DIRS: &[&str] = &["/dev/shm", "/run/shm", "/var/run/shm"];

/// Default log filter expression.
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default host name passed to the graceful shutdown command.
pub fn default_host() -> String {
    String::from("localhost")
}

/// Default service port.
pub fn default_service_port() -> u16 {
    DEFAULT_SERVICE_PORT
}

/// Default primary service binary.
pub fn default_server_binary() -> Utf8PathBuf {
    installed("gridd")
}

/// Default delayed/rule-processing binary.
pub fn default_delay_server_binary() -> Utf8PathBuf {
    installed("gridd-delay")
}

/// Default message-bus binary.
pub fn default_message_bus_binary() -> Utf8PathBuf {
    installed("gridd-bus")
}

/// Default worker-agent binary.
pub fn default_agent_binary() -> Utf8PathBuf {
    installed("gridd-agent")
}

/// Default graceful shutdown command.
pub fn default_shutdown_command() -> Utf8PathBuf {
    installed("gridd-shutdown")
}

/// Default log directory.
pub fn default_log_directory() -> Utf8PathBuf {
    Utf8PathBuf::from("/var/log/gridd")
}

/// Default location of the shipped version manifest.
pub fn default_version_manifest() -> Utf8PathBuf {
    Utf8PathBuf::from("/usr/share/gridd/VERSION.json")
}

/// Default directory holding vendor scripts run by catalog migrations.
pub fn default_script_directory() -> Utf8PathBuf {
    Utf8PathBuf::from("/usr/share/gridd/sql")
}

/// Default catalog dialect.
pub fn default_database_dialect() -> Dialect {
    Dialect::Postgres
}

/// Default catalog host.
pub fn default_database_host() -> String {
    String::from("localhost")
}

/// Default catalog port.
pub fn default_database_port() -> u16 {
    5432
}

/// Default catalog database or service name.
pub fn default_database_name() -> String {
    String::from("ICAT")
}

/// Default shared-memory directories as owned paths.
pub fn default_shared_memory_dirs() -> Vec<Utf8PathBuf> {
    DEFAULT_SHARED_MEMORY_DIRS
        .iter()
        .map(Utf8PathBuf::from)
        .collect()
}

/// Default connection attempt count.
pub fn default_startup_attempts() -> u32 {
    DEFAULT_STARTUP_ATTEMPTS
}

/// Default connection attempt interval.
pub fn default_startup_interval_ms() -> u64 {
    DEFAULT_STARTUP_INTERVAL_MS
}

/// Default shutdown budget.
pub fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

/// Default shutdown poll interval.
pub fn default_shutdown_poll_ms() -> u64 {
    DEFAULT_SHUTDOWN_POLL_MS
}

fn installed(name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_INSTALL_PREFIX).join(name)
}
