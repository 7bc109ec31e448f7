//! Catalog access and schema migration for the grid service.
//!
//! The crate never links a database driver. Embedders supply a
//! [`CatalogConnector`] that opens [`CatalogConnection`]s; the
//! [`MigrationEngine`] reads the schema version row and advances the catalog
//! one committed step at a time until it matches the installed software.

mod connection;
mod dialect;
mod engine;
mod error;
mod plan;
mod script;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;


pub use connection::{
    CatalogConnection, CatalogConnector, ConnectionError, Row, Session, SqlValue, Transaction,
};
pub use dialect::{ColumnType, DialectAdapter, VendorCommand};
pub use engine::{
    MigrationEngine, MigrationReport, SCHEMA_VERSION_NAMESPACE, SCHEMA_VERSION_OPTION,
    SELECT_SCHEMA_VERSION, UPDATE_SCHEMA_VERSION, read_schema_version,
};
pub use error::{MigrationError, MigrationErrorKind, StepError};
pub use plan::{
    ActionBuilder, BASELINE_SCHEMA_VERSION, MigrationAction, MigrationPlan, MigrationStep,
};
pub use script::{ScriptError, ScriptRunner, SystemScriptRunner};

pub(crate) const CATALOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::catalog");
pub(crate) const MIGRATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::migrate");
