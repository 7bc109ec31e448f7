//! Shared configuration for the `gridctl` lifecycle tooling.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, then an optional
//! configuration file, then `GRIDCTL_*` environment variables, then command
//! line flags. Callers should not hold on to a [`Config`] across lifecycle
//! operations; use a [`ConfigStore`] and refresh it at the start of each one.

mod defaults;
mod dialect;
mod logging;
mod manifest;
mod source;
mod validation;

use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_INSTALL_PREFIX, DEFAULT_LOG_FILTER, DEFAULT_SERVICE_PORT, DEFAULT_SHARED_MEMORY_DIRS,
    DEFAULT_SHUTDOWN_POLL_MS, DEFAULT_SHUTDOWN_TIMEOUT_SECS, DEFAULT_STARTUP_ATTEMPTS,
    DEFAULT_STARTUP_INTERVAL_MS,
};
pub use dialect::{Dialect, DialectParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use manifest::{ManifestError, VersionManifest};
pub use source::{ConfigSource, ConfigStore, StaticConfigSource, SystemConfigSource};
pub use validation::ValidationIssue;

/// Configuration consumed by the lifecycle controller and migration engine.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "GRIDCTL")]
pub struct Config {
    /// Host name handed to the graceful shutdown command.
    #[serde(default = "defaults::default_host")]
    #[ortho_config(default = defaults::default_host())]
    pub host: String,
    /// TCP port the primary service listens on.
    #[serde(default = "defaults::default_service_port")]
    #[ortho_config(default = defaults::default_service_port())]
    pub service_port: u16,
    /// Primary service executable.
    #[serde(default = "defaults::default_server_binary")]
    #[ortho_config(default = defaults::default_server_binary())]
    pub server_binary: Utf8PathBuf,
    /// Delayed rule-processing executable.
    #[serde(default = "defaults::default_delay_server_binary")]
    #[ortho_config(default = defaults::default_delay_server_binary())]
    pub delay_server_binary: Utf8PathBuf,
    /// Message-bus executable.
    #[serde(default = "defaults::default_message_bus_binary")]
    #[ortho_config(default = defaults::default_message_bus_binary())]
    pub message_bus_binary: Utf8PathBuf,
    /// Worker-agent executable.
    #[serde(default = "defaults::default_agent_binary")]
    #[ortho_config(default = defaults::default_agent_binary())]
    pub agent_binary: Utf8PathBuf,
    /// Command asking the service to shut itself down.
    #[serde(default = "defaults::default_shutdown_command")]
    #[ortho_config(default = defaults::default_shutdown_command())]
    pub shutdown_command: Utf8PathBuf,
    /// Directory the service writes its logs to.
    #[serde(default = "defaults::default_log_directory")]
    #[ortho_config(default = defaults::default_log_directory())]
    pub log_directory: Utf8PathBuf,
    /// Whether this host owns the catalog and must migrate it on start.
    #[serde(default)]
    #[ortho_config(default = false)]
    pub catalog_host: bool,
    /// SQL dialect of the catalog.
    #[serde(default = "defaults::default_database_dialect")]
    #[ortho_config(default = defaults::default_database_dialect())]
    pub database_dialect: Dialect,
    /// Catalog server host.
    #[serde(default = "defaults::default_database_host")]
    #[ortho_config(default = defaults::default_database_host())]
    pub database_host: String,
    /// Catalog server port.
    #[serde(default = "defaults::default_database_port")]
    #[ortho_config(default = defaults::default_database_port())]
    pub database_port: u16,
    /// Catalog database name, or the service name for Oracle.
    #[serde(default = "defaults::default_database_name")]
    #[ortho_config(default = defaults::default_database_name())]
    pub database_name: String,
    /// Catalog account.
    #[serde(default)]
    #[ortho_config(default = String::new())]
    pub database_user: String,
    /// Catalog account password.
    #[serde(default)]
    #[ortho_config(default = String::new())]
    pub database_password: String,
    /// ODBC driver name registered for the catalog connection.
    #[serde(default)]
    #[ortho_config(default = String::new())]
    pub odbc_driver: String,
    /// Directories scanned for shared-memory cache files of killed processes.
    #[serde(default = "defaults::default_shared_memory_dirs")]
    #[ortho_config(default = defaults::default_shared_memory_dirs())]
    pub shared_memory_dirs: Vec<Utf8PathBuf>,
    /// Location of the shipped version manifest.
    #[serde(default = "defaults::default_version_manifest")]
    #[ortho_config(default = defaults::default_version_manifest())]
    pub version_manifest: Utf8PathBuf,
    /// Directory holding vendor scripts referenced by catalog migrations.
    #[serde(default = "defaults::default_script_directory")]
    #[ortho_config(default = defaults::default_script_directory())]
    pub script_directory: Utf8PathBuf,
    /// Connection attempts made after spawning the service.
    #[serde(default = "defaults::default_startup_attempts")]
    #[ortho_config(default = defaults::default_startup_attempts())]
    pub startup_attempts: u32,
    /// Milliseconds between connection attempts.
    #[serde(default = "defaults::default_startup_interval_ms")]
    #[ortho_config(default = defaults::default_startup_interval_ms())]
    pub startup_interval_ms: u64,
    /// Seconds granted to a graceful shutdown before escalation.
    #[serde(default = "defaults::default_shutdown_timeout_secs")]
    #[ortho_config(default = defaults::default_shutdown_timeout_secs())]
    pub shutdown_timeout_secs: u64,
    /// Milliseconds between process-table polls during shutdown.
    #[serde(default = "defaults::default_shutdown_poll_ms")]
    #[ortho_config(default = defaults::default_shutdown_poll_ms())]
    pub shutdown_poll_ms: u64,
    /// Tracing filter expression.
    #[serde(default = "defaults::default_log_filter")]
    #[ortho_config(default = defaults::default_log_filter())]
    pub log_filter: String,
    /// Tracing output format.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: defaults::default_host(),
            service_port: defaults::default_service_port(),
            server_binary: defaults::default_server_binary(),
            delay_server_binary: defaults::default_delay_server_binary(),
            message_bus_binary: defaults::default_message_bus_binary(),
            agent_binary: defaults::default_agent_binary(),
            shutdown_command: defaults::default_shutdown_command(),
            log_directory: defaults::default_log_directory(),
            catalog_host: false,
            database_dialect: defaults::default_database_dialect(),
            database_host: defaults::default_database_host(),
            database_port: defaults::default_database_port(),
            database_name: defaults::default_database_name(),
            database_user: String::new(),
            database_password: String::new(),
            odbc_driver: String::new(),
            shared_memory_dirs: defaults::default_shared_memory_dirs(),
            version_manifest: defaults::default_version_manifest(),
            script_directory: defaults::default_script_directory(),
            startup_attempts: defaults::default_startup_attempts(),
            startup_interval_ms: defaults::default_startup_interval_ms(),
            shutdown_timeout_secs: defaults::default_shutdown_timeout_secs(),
            shutdown_poll_ms: defaults::default_shutdown_poll_ms(),
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Config")
            .field("host", &self.host)
            .field("service_port", &self.service_port)
            .field("server_binary", &self.server_binary)
            .field("catalog_host", &self.catalog_host)
            .field("database", &self.database())
            .field("shared_memory_dirs", &self.shared_memory_dirs)
            .field("log_filter", &self.log_filter)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// TCP port the primary service listens on.
    #[must_use]
    pub const fn service_port(&self) -> u16 {
        self.service_port
    }

    /// Primary service executable.
    #[must_use]
    pub fn server_binary(&self) -> &Utf8Path {
        self.server_binary.as_path()
    }

    /// Every executable treated as part of the managed service, primary first.
    #[must_use]
    pub fn managed_binaries(&self) -> Vec<&Utf8Path> {
        vec![
            self.server_binary.as_path(),
            self.delay_server_binary.as_path(),
            self.message_bus_binary.as_path(),
            self.agent_binary.as_path(),
        ]
    }

    /// Managed executables other than the primary service binary.
    #[must_use]
    pub fn sibling_binaries(&self) -> Vec<&Utf8Path> {
        self.managed_binaries()
            .into_iter()
            .filter(|binary| *binary != self.server_binary())
            .collect()
    }

    /// Connection parameters for the catalog.
    #[must_use]
    pub fn database(&self) -> DatabaseSettings {
        DatabaseSettings {
            dialect: self.database_dialect,
            host: self.database_host.clone(),
            port: self.database_port,
            name: self.database_name.clone(),
            user: self.database_user.clone(),
            password: self.database_password.clone(),
            odbc_driver: self.odbc_driver.clone(),
        }
    }

    /// Delay between post-launch connection attempts.
    #[must_use]
    pub const fn startup_interval(&self) -> Duration {
        Duration::from_millis(self.startup_interval_ms)
    }

    /// Budget granted to a graceful shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Delay between process-table polls while stopping.
    #[must_use]
    pub const fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Tracing output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Parameters needed to open a catalog connection.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// SQL dialect of the catalog.
    pub dialect: Dialect,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name, or the service name for Oracle.
    pub name: String,
    /// Account name.
    pub user: String,
    /// Account password.
    pub password: String,
    /// Registered ODBC driver name.
    pub odbc_driver: String,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DatabaseSettings")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("odbc_driver", &self.odbc_driver)
            .finish()
    }
}
