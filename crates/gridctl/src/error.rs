//! Fatal errors and recoverable warnings raised by lifecycle operations.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gridctl_catalog::{ConnectionError, MigrationError, MigrationErrorKind};
use gridctl_config::{ManifestError, ValidationIssue};
use ortho_config::OrthoError;
use thiserror::Error;

use crate::process::ProcessTableError;

/// Classification of [`LifecycleError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration or the version manifest could not be read.
    Configuration,
    /// A pre-launch check failed; nothing was spawned.
    Preflight,
    /// The service was spawned but never became reachable.
    StartupTimeout,
    /// The catalog is ahead of the software or the upgrade is unsupported.
    SchemaVersion,
    /// The schema version row is missing, duplicated, or corrupt.
    SchemaRead,
    /// A migration step failed and was rolled back.
    Migration,
    /// The catalog driver failed.
    Catalog,
    /// The service executable could not be launched.
    Spawn,
    /// The process table could not be enumerated.
    ProcessTable,
}

/// Fatal outcome of `start`, `stop`, `restart`, or `status`.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    Configuration(#[source] Arc<OrthoError>),
    /// The version manifest could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// The service executable does not exist.
    #[error("service executable {path:?} does not exist")]
    MissingExecutable {
        /// Configured executable path.
        path: PathBuf,
    },
    /// The log directory rejected a probe file.
    #[error("log directory {path:?} is not writable: {source}")]
    LogDirectoryUnwritable {
        /// Configured log directory.
        path: PathBuf,
        /// Failure creating or removing the probe file.
        #[source]
        source: io::Error,
    },
    /// The service port is already bound.
    #[error("port {port} is unavailable; is the service already running? ({source})")]
    PortUnavailable {
        /// Configured service port.
        port: u16,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// The service never became reachable; it may still be running.
    #[error(
        "service {binary:?} did not accept connections on port {port} after {attempts} attempts"
    )]
    StartupTimeout {
        /// Primary executable.
        binary: PathBuf,
        /// Configured service port.
        port: u16,
        /// Attempts made.
        attempts: u32,
    },
    /// The catalog schema could not be brought up to date.
    #[error(transparent)]
    Schema(#[from] MigrationError),
    /// The catalog driver failed before migrating.
    #[error("catalog connection failed: {0}")]
    Catalog(#[from] ConnectionError),
    /// The service executable could not be spawned.
    #[error("failed to spawn {binary:?}: {source}")]
    Spawn {
        /// Executable path.
        binary: PathBuf,
        /// Spawn failure.
        #[source]
        source: io::Error,
    },
    /// The process table could not be read.
    #[error(transparent)]
    ProcessTable(#[from] ProcessTableError),
}

impl LifecycleError {
    /// Classifies the error so callers can branch without inspecting messages.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::Manifest(_) => ErrorKind::Configuration,
            Self::MissingExecutable { .. }
            | Self::LogDirectoryUnwritable { .. }
            | Self::PortUnavailable { .. } => ErrorKind::Preflight,
            Self::StartupTimeout { .. } => ErrorKind::StartupTimeout,
            Self::Schema(error) => match error.kind() {
                MigrationErrorKind::SchemaRead => ErrorKind::SchemaRead,
                MigrationErrorKind::SchemaVersion => ErrorKind::SchemaVersion,
                MigrationErrorKind::Step => ErrorKind::Migration,
                MigrationErrorKind::Connection => ErrorKind::Catalog,
            },
            Self::Catalog(_) => ErrorKind::Catalog,
            Self::Spawn { .. } => ErrorKind::Spawn,
            Self::ProcessTable(_) => ErrorKind::ProcessTable,
        }
    }
}

/// Recoverable conditions. Reported and logged, never returned as errors.
#[derive(Debug, Error)]
pub enum LifecycleWarning {
    /// The graceful shutdown command did not exit in time and was killed.
    #[error("shutdown command {command:?} did not complete within {timeout:?}; escalating")]
    ShutdownTimeout {
        /// Shutdown command path.
        command: PathBuf,
        /// Budget it was given.
        timeout: Duration,
    },
    /// The graceful shutdown command could not run or exited unsuccessfully.
    #[error("shutdown command {command:?} failed: {reason}")]
    ShutdownCommandFailed {
        /// Shutdown command path.
        command: PathBuf,
        /// Launch error or exit status.
        reason: String,
    },
    /// A force kill failed for a reason other than the process having exited.
    #[error("failed to kill pid {pid}: {reason}")]
    KillFailed {
        /// Target process.
        pid: u32,
        /// OS error.
        reason: String,
    },
    /// A cache file could not be removed.
    #[error("failed to remove cache file {path:?}: {source}")]
    CacheCleanup {
        /// Cache file path.
        path: PathBuf,
        /// Removal failure.
        #[source]
        source: io::Error,
    },
    /// Configuration validation found a problem.
    #[error("configuration issue: {0}")]
    InvalidConfiguration(ValidationIssue),
    /// `stop` found nothing running.
    #[error("no process is running {binary:?}; nothing to stop")]
    AlreadyStopped {
        /// Primary executable.
        binary: PathBuf,
    },
}
