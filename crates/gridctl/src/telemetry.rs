//! Process-wide tracing subscriber for lifecycle tooling.
//!
//! Lifecycle events carry `gridctl::*` and `gridctl_catalog::*` targets. The
//! default filter keeps those at `info` and everything else at `warn`.

use std::io::{self, IsTerminal};

use gridctl_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, info, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use crate::LIFECYCLE_TARGET;

static INSTALLED: OnceCell<TelemetryHandle> = OnceCell::new();

/// Describes the subscriber that is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
    filter: String,
}

impl TelemetryHandle {
    /// Output format chosen by the first initialisation.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }

    /// Filter expression chosen by the first initialisation.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter did not parse.
    #[error("invalid log filter '{filter}': {reason}")]
    Filter {
        /// Expression as configured.
        filter: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// Another global subscriber is already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return the handle describing the first installation, even if
/// `config` now asks for a different format or filter.
///
/// # Errors
///
/// Fails when `log_filter` is not a valid filter expression or a subscriber
/// was installed outside this module.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install_subscriber(config))
        .cloned()
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|error| TelemetryError::Filter {
        filter: expression.to_owned(),
        reason: error.to_string(),
    })
}

fn install_subscriber(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;

    let handle = TelemetryHandle {
        format: config.log_format(),
        filter: config.log_filter().to_owned(),
    };
    info!(
        target: LIFECYCLE_TARGET,
        format = %handle.format,
        filter = %handle.filter,
        "telemetry initialised"
    );
    Ok(handle)
}
