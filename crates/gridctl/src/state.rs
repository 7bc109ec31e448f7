//! In-memory view of the managed service's lifecycle.

use std::fmt;

/// Lifecycle state tracked by the process controller. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    /// No managed process is known to be running.
    #[default]
    Stopped,
    /// The service was spawned and is being polled for reachability.
    Starting,
    /// The service accepted a connection.
    Running,
    /// A stop is in progress.
    Stopping,
    /// Startup timed out, a start failed after preflight, or processes
    /// survived escalation.
    Failed,
}

impl ServiceState {
    /// Stable lower-case label used in structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
