//! Structured reporting of lifecycle transitions and recoverable warnings.

use std::sync::Arc;

use gridctl_catalog::MigrationReport;

use crate::error::{LifecycleError, LifecycleWarning};
use crate::state::ServiceState;

/// Observer notified as lifecycle operations progress.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked whenever the controller changes state.
    fn state_changed(&self, from: ServiceState, to: ServiceState);

    /// Invoked for every recoverable condition.
    fn warning(&self, warning: &LifecycleWarning);

    /// Invoked after the catalog schema check completes.
    fn migration_completed(&self, report: &MigrationReport);

    /// Invoked for every pid force-killed during escalation.
    fn process_killed(&self, pid: u32);

    /// Invoked when an operation fails fatally.
    fn operation_failed(&self, operation: &'static str, error: &LifecycleError);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn state_changed(&self, from: ServiceState, to: ServiceState) {
        (**self).state_changed(from, to);
    }

    fn warning(&self, warning: &LifecycleWarning) {
        (**self).warning(warning);
    }

    fn migration_completed(&self, report: &MigrationReport) {
        (**self).migration_completed(report);
    }

    fn process_killed(&self, pid: u32) {
        (**self).process_killed(pid);
    }

    fn operation_failed(&self, operation: &'static str, error: &LifecycleError) {
        (**self).operation_failed(operation, error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn state_changed(&self, from: ServiceState, to: ServiceState) {
        tracing::info!(
            target: crate::LIFECYCLE_TARGET,
            event = "state_changed",
            from = %from,
            to = %to,
            "service state changed"
        );
    }

    fn warning(&self, warning: &LifecycleWarning) {
        tracing::warn!(
            target: crate::LIFECYCLE_TARGET,
            event = "warning",
            warning = %warning,
            "recoverable lifecycle problem"
        );
    }

    fn migration_completed(&self, report: &MigrationReport) {
        tracing::info!(
            target: crate::LIFECYCLE_TARGET,
            event = "migration_completed",
            from = report.from,
            to = report.to,
            applied = ?report.applied,
            "catalog schema checked"
        );
    }

    fn process_killed(&self, pid: u32) {
        tracing::warn!(
            target: crate::SHUTDOWN_TARGET,
            event = "process_killed",
            pid,
            "force-killed managed process"
        );
    }

    fn operation_failed(&self, operation: &'static str, error: &LifecycleError) {
        tracing::error!(
            target: crate::LIFECYCLE_TARGET,
            event = "operation_failed",
            operation,
            kind = ?error.kind(),
            error = %error,
            "lifecycle operation failed"
        );
    }
}
