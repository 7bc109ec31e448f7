//! Error surface of the migration engine.

use thiserror::Error;

use crate::connection::ConnectionError;
use crate::script::ScriptError;

/// Classification of [`MigrationError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationErrorKind {
    /// The schema version row is missing, duplicated, or unreadable.
    SchemaRead,
    /// The catalog is ahead of the software or no step exists for the next version.
    SchemaVersion,
    /// A step failed and was rolled back.
    Step,
    /// The driver failed outside a step.
    Connection,
}

/// Fatal outcomes of reading or advancing the catalog schema.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The catalog has no schema version row.
    #[error(
        "no schema version present in the catalog; pre-versioned catalogs must be upgraded manually"
    )]
    NoSchemaVersion,
    /// More than one schema version row exists.
    #[error("catalog holds {rows} schema version rows; exactly one is required")]
    AmbiguousSchemaVersion {
        /// Number of rows found.
        rows: usize,
    },
    /// The schema version row is not a non-negative integer.
    #[error("catalog schema version '{value}' is not a valid version number")]
    CorruptSchemaVersion {
        /// Stored value.
        value: String,
    },
    /// The catalog is newer than the installed software.
    #[error(
        "catalog schema version {current} is newer than the supported version {target}; downgrades are unsupported"
    )]
    Downgrade {
        /// Version recorded in the catalog.
        current: u32,
        /// Version the software expects.
        target: u32,
    },
    /// No step is registered for the requested version.
    #[error("upgrade to schema version {version} is unsupported")]
    UnsupportedStep {
        /// Version without a step.
        version: u32,
    },
    /// A step failed; its transaction was rolled back.
    #[error("migration to schema version {version} failed and was rolled back: {source}")]
    StepFailed {
        /// Version the step would have produced.
        version: u32,
        /// Underlying failure.
        #[source]
        source: StepError,
    },
    /// Reading the schema version or configuring the connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl MigrationError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> MigrationErrorKind {
        match self {
            Self::NoSchemaVersion
            | Self::AmbiguousSchemaVersion { .. }
            | Self::CorruptSchemaVersion { .. } => MigrationErrorKind::SchemaRead,
            Self::Downgrade { .. } | Self::UnsupportedStep { .. } => {
                MigrationErrorKind::SchemaVersion
            }
            Self::StepFailed { .. } => MigrationErrorKind::Step,
            Self::Connection(_) => MigrationErrorKind::Connection,
        }
    }
}

/// Failures inside a single migration step.
#[derive(Debug, Error)]
pub enum StepError {
    /// A statement or the commit failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// A vendor script failed.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// The version update touched an unexpected number of rows.
    #[error("schema version update affected {rows} rows instead of one")]
    VersionNotAdvanced {
        /// Rows reported by the driver.
        rows: u64,
    },
}
