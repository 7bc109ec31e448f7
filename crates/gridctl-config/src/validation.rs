//! Non-fatal configuration checks.
//!
//! Validation never blocks a lifecycle operation. Issues are reported so the
//! controller can log them as warnings before continuing.

use std::fmt;

use camino::Utf8PathBuf;

use crate::Config;

/// A single configuration problem detected by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// A managed executable is configured with a relative path.
    RelativeBinary {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// The service port is zero.
    ZeroServicePort,
    /// No shared-memory directory is configured, so cache files are never reaped.
    NoSharedMemoryDirs,
    /// A catalog host is missing a required database setting.
    MissingDatabaseSetting {
        /// Name of the missing field.
        field: &'static str,
    },
    /// Post-launch polling is configured to make no attempts.
    ZeroStartupAttempts,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RelativeBinary { path } => {
                write!(formatter, "managed binary '{path}' is not an absolute path")
            }
            Self::ZeroServicePort => formatter.write_str("service_port must not be zero"),
            Self::NoSharedMemoryDirs => {
                formatter.write_str("shared_memory_dirs is empty; cache files will not be reaped")
            }
            Self::MissingDatabaseSetting { field } => {
                write!(formatter, "catalog host requires '{field}' to be set")
            }
            Self::ZeroStartupAttempts => formatter.write_str("startup_attempts must not be zero"),
        }
    }
}

impl Config {
    /// Collects every configuration issue without failing.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues: Vec<ValidationIssue> = self
            .managed_binaries()
            .into_iter()
            .chain(std::iter::once(self.shutdown_command.as_path()))
            .filter(|path| !path.is_absolute())
            .map(|path| ValidationIssue::RelativeBinary {
                path: path.to_path_buf(),
            })
            .collect();
        if self.service_port == 0 {
            issues.push(ValidationIssue::ZeroServicePort);
        }
        if self.shared_memory_dirs.is_empty() {
            issues.push(ValidationIssue::NoSharedMemoryDirs);
        }
        if self.startup_attempts == 0 {
            issues.push(ValidationIssue::ZeroStartupAttempts);
        }
        if self.catalog_host {
            let required = [
                ("database_host", self.database_host.as_str()),
                ("database_name", self.database_name.as_str()),
                ("database_user", self.database_user.as_str()),
            ];
            issues.extend(
                required
                    .into_iter()
                    .filter(|(_, value)| value.trim().is_empty())
                    .map(|(field, _)| ValidationIssue::MissingDatabaseSetting { field }),
            );
        }
        issues
    }
}
