//! Schema version detection and ordered, transactional migration.

use tracing::{info, warn};

use crate::MIGRATE_TARGET;
use crate::connection::{CatalogConnection, SqlValue, Transaction};
use crate::dialect::DialectAdapter;
use crate::error::{MigrationError, StepError};
use crate::plan::{MigrationAction, MigrationPlan, MigrationStep};
use crate::script::ScriptRunner;

/// Grid configuration namespace holding the schema version row.
pub const SCHEMA_VERSION_NAMESPACE: &str = "database";

/// Grid configuration option naming the schema version row.
pub const SCHEMA_VERSION_OPTION: &str = "schema_version";

/// Reads the schema version row.
pub const SELECT_SCHEMA_VERSION: &str =
    "SELECT option_value FROM grid_configuration WHERE namespace = ? AND option_name = ?";

/// Advances the schema version row.
pub const UPDATE_SCHEMA_VERSION: &str =
    "UPDATE grid_configuration SET option_value = ? WHERE namespace = ? AND option_name = ?";

/// Summary of a completed [`MigrationEngine::ensure_up_to_date`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version found before migrating.
    pub from: u32,
    /// Version recorded after migrating.
    pub to: u32,
    /// Versions applied, in order.
    pub applied: Vec<u32>,
}

impl MigrationReport {
    /// Reports whether any step ran.
    #[must_use]
    pub fn migrated(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Reads the catalog schema version.
///
/// # Errors
///
/// Returns a schema-read error when the row is absent, duplicated, or not a
/// non-negative integer, and a connection error when the query fails.
pub fn read_schema_version(connection: &mut dyn CatalogConnection) -> Result<u32, MigrationError> {
    let mut rows = connection
        .query(SELECT_SCHEMA_VERSION, &version_key())?
        .into_iter();
    let Some(row) = rows.next() else {
        return Err(MigrationError::NoSchemaVersion);
    };
    let remaining = rows.count();
    if remaining > 0 {
        return Err(MigrationError::AmbiguousSchemaVersion {
            rows: remaining + 1,
        });
    }
    let value = row.into_iter().next().unwrap_or(SqlValue::Null);
    parse_version(&value)
}

fn parse_version(value: &SqlValue) -> Result<u32, MigrationError> {
    match value {
        SqlValue::Integer(number) => {
            u32::try_from(*number).map_err(|_| MigrationError::CorruptSchemaVersion {
                value: number.to_string(),
            })
        }
        SqlValue::Text(text) => {
            text.trim()
                .parse::<u32>()
                .map_err(|_| MigrationError::CorruptSchemaVersion {
                    value: text.clone(),
                })
        }
        SqlValue::Null => Err(MigrationError::CorruptSchemaVersion {
            value: String::from("NULL"),
        }),
    }
}

fn version_key() -> [SqlValue; 2] {
    [
        SqlValue::text(SCHEMA_VERSION_NAMESPACE),
        SqlValue::text(SCHEMA_VERSION_OPTION),
    ]
}

/// Advances a catalog one version at a time until it matches the software.
pub struct MigrationEngine {
    adapter: DialectAdapter,
    plan: MigrationPlan,
    scripts: Box<dyn ScriptRunner>,
}

impl MigrationEngine {
    /// Builds an engine for one dialect and plan.
    #[must_use]
    pub fn new(adapter: DialectAdapter, plan: MigrationPlan, scripts: Box<dyn ScriptRunner>) -> Self {
        Self {
            adapter,
            plan,
            scripts,
        }
    }

    /// Dialect adapter resolved for this engine.
    #[must_use]
    pub const fn adapter(&self) -> DialectAdapter {
        self.adapter
    }

    /// Reads the catalog schema version.
    ///
    /// # Errors
    ///
    /// See [`read_schema_version`].
    pub fn get_current_version(
        &self,
        connection: &mut dyn CatalogConnection,
    ) -> Result<u32, MigrationError> {
        read_schema_version(connection)
    }

    /// Migrates the catalog to `target`, committing after every step.
    ///
    /// A failing step is rolled back and reported; versions committed before
    /// it stay in place, so a later run resumes from the last committed
    /// version.
    ///
    /// # Errors
    ///
    /// Fails without modifying the catalog when it is ahead of `target` or a
    /// step for the next version is not registered.
    pub fn ensure_up_to_date(
        &self,
        connection: &mut dyn CatalogConnection,
        target: u32,
    ) -> Result<MigrationReport, MigrationError> {
        connection.set_autocommit(false)?;
        let from = self.get_current_version(connection)?;
        let mut current = from;
        let mut applied = Vec::new();
        loop {
            if current == target {
                if applied.is_empty() {
                    info!(
                        target: MIGRATE_TARGET,
                        version = current,
                        "catalog schema is up to date"
                    );
                }
                return Ok(MigrationReport {
                    from,
                    to: current,
                    applied,
                });
            }
            if current > target {
                return Err(MigrationError::Downgrade { current, target });
            }
            let next = current + 1;
            let step = self
                .plan
                .step(next)
                .ok_or(MigrationError::UnsupportedStep { version: next })?;
            self.apply_step(connection, step)?;
            applied.push(next);
            current = self.get_current_version(connection)?;
        }
    }

    fn apply_step(
        &self,
        connection: &mut dyn CatalogConnection,
        step: &MigrationStep,
    ) -> Result<(), MigrationError> {
        let version = step.version();
        info!(
            target: MIGRATE_TARGET,
            version,
            description = step.description(),
            dialect = %self.adapter.dialect(),
            "applying catalog migration"
        );
        let mut transaction = Transaction::begin(connection);
        let outcome = self
            .run_actions(transaction.connection(), step)
            .and_then(|()| write_version(transaction.connection(), version));
        match outcome {
            Ok(()) => {
                transaction
                    .commit()
                    .map_err(|source| MigrationError::StepFailed {
                        version,
                        source: StepError::Connection(source),
                    })?;
                info!(target: MIGRATE_TARGET, version, "catalog migration committed");
                Ok(())
            }
            Err(source) => {
                if let Err(error) = transaction.rollback() {
                    warn!(
                        target: MIGRATE_TARGET,
                        version,
                        error = %error,
                        "rollback after failed migration also failed"
                    );
                }
                Err(MigrationError::StepFailed { version, source })
            }
        }
    }

    fn run_actions(
        &self,
        connection: &mut dyn CatalogConnection,
        step: &MigrationStep,
    ) -> Result<(), StepError> {
        for action in step.actions(self.adapter) {
            match action {
                MigrationAction::Execute { statement, params } => {
                    connection.execute(&statement, &params)?;
                }
                MigrationAction::Backfill { select, update } => {
                    let rows = connection.query(&select, &[])?;
                    for row in rows {
                        connection.execute(&update, &row)?;
                    }
                }
                MigrationAction::VendorScript { script } => {
                    self.scripts.run(&script)?;
                }
            }
        }
        Ok(())
    }
}

fn write_version(connection: &mut dyn CatalogConnection, version: u32) -> Result<(), StepError> {
    let [namespace, option] = version_key();
    let rows = connection.execute(
        UPDATE_SCHEMA_VERSION,
        &[SqlValue::text(version.to_string()), namespace, option],
    )?;
    if rows == 1 {
        Ok(())
    } else {
        Err(StepError::VersionNotAdvanced { rows })
    }
}
