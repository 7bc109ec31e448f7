//! Lifecycle control for the grid service.
//!
//! [`ProcessController`] starts, stops, restarts, and inspects one logical
//! service (a primary executable plus a fixed set of sibling executables) on a
//! single host. Starting a catalog host first brings the catalog schema up to
//! date through [`gridctl_catalog::MigrationEngine`]. Stopping asks the
//! service to exit through its shutdown command and force-kills whatever
//! outlives the budget, reaping each killed pid's shared-memory cache files.
//!
//! Everything is synchronous. Waits are bounded sleep-poll loops.

mod controller;
mod error;
mod poller;
mod probe;
mod process;
mod reaper;
mod reporter;
mod shutdown;
mod spawning;
mod state;
pub mod telemetry;

#[cfg(test)]
mod test_doubles;

pub use controller::{ProcessController, StartReport, StatusReport, StopReport};
pub use error::{ErrorKind, LifecycleError, LifecycleWarning};
pub use poller::ConnectionPoller;
pub use probe::probe_port;
pub use process::{KillError, KillOutcome, ProcessTable, ProcessTableError, SystemProcessTable};
pub use reaper::{CacheReaper, ReapReport, SharedMemoryReaper};
pub use reporter::{LifecycleReporter, StructuredLifecycleReporter};
pub use shutdown::{
    CommandExit, CommandShutdownLauncher, EscalationReport, GracefulOutcome, ShutdownCoordinator,
    ShutdownHandle, ShutdownLauncher, await_graceful, wait_for_exit,
};
pub use spawning::{CommandServiceLauncher, ServiceLauncher};
pub use state::ServiceState;

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
pub(crate) const SHUTDOWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shutdown");
pub(crate) const REAPER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reaper");
