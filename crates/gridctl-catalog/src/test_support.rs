//! In-memory catalog double for migration and lifecycle tests.
//!
//! The double understands the schema version query and update, records every
//! other statement, and applies commit and rollback to the version row so
//! tests can observe exactly what a migration run persisted.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use gridctl_config::DatabaseSettings;

use crate::connection::{CatalogConnection, CatalogConnector, ConnectionError, Row, SqlValue};
use crate::engine::{SELECT_SCHEMA_VERSION, UPDATE_SCHEMA_VERSION};
use crate::script::{ScriptError, ScriptRunner};

#[derive(Debug, Default)]
struct CatalogState {
    committed: Vec<SqlValue>,
    pending: Option<Vec<SqlValue>>,
    executed: Vec<(String, Vec<SqlValue>)>,
    committed_versions: Vec<String>,
    rollbacks: usize,
    fail_on: Option<String>,
    query_rows: HashMap<String, Vec<Row>>,
    autocommit: bool,
    closed: bool,
    prepared: usize,
    opened: usize,
}

/// Shared handle to an in-memory catalog; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCatalog {
    state: Rc<RefCell<CatalogState>>,
}

impl ScriptedCatalog {
    /// Catalog with a single schema version row.
    #[must_use]
    pub fn at_version(version: u32) -> Self {
        Self::with_version_rows(vec![SqlValue::text(version.to_string())])
    }

    /// Catalog with arbitrary schema version rows.
    #[must_use]
    pub fn with_version_rows(rows: Vec<SqlValue>) -> Self {
        let catalog = Self::default();
        {
            let mut state = catalog.state.borrow_mut();
            state.committed = rows;
            state.autocommit = true;
        }
        catalog
    }

    /// Makes every statement containing `fragment` fail.
    pub fn fail_on(&self, fragment: &str) {
        self.state.borrow_mut().fail_on = Some(fragment.to_owned());
    }

    /// Clears any configured failure.
    pub fn clear_failure(&self) {
        self.state.borrow_mut().fail_on = None;
    }

    /// Registers the rows returned for `statement`.
    pub fn with_rows(&self, statement: &str, rows: Vec<Row>) {
        self.state
            .borrow_mut()
            .query_rows
            .insert(statement.to_owned(), rows);
    }

    /// Committed schema version rows.
    #[must_use]
    pub fn committed_version(&self) -> Option<String> {
        let state = self.state.borrow();
        state.committed.first().and_then(SqlValue::as_text)
    }

    /// Version value persisted by each commit, in order.
    #[must_use]
    pub fn committed_versions(&self) -> Vec<String> {
        self.state.borrow().committed_versions.clone()
    }

    /// Every non-version statement executed, in order, including rolled back ones.
    #[must_use]
    pub fn executed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.state.borrow().executed.clone()
    }

    /// Number of rollbacks issued.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.state.borrow().rollbacks
    }

    /// Current autocommit setting.
    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.state.borrow().autocommit
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Number of connections opened through [`ScriptedConnector`].
    #[must_use]
    pub fn opened(&self) -> usize {
        self.state.borrow().opened
    }

    /// Number of driver registrations performed through [`ScriptedConnector`].
    #[must_use]
    pub fn prepared(&self) -> usize {
        self.state.borrow().prepared
    }

    fn check_failure(&self, statement: &str) -> Result<(), ConnectionError> {
        let state = self.state.borrow();
        match state.fail_on.as_deref() {
            Some(fragment) if statement.contains(fragment) => Err(ConnectionError::Statement {
                statement: statement.to_owned(),
                message: String::from("scripted failure"),
            }),
            _ => Ok(()),
        }
    }
}

impl CatalogConnection for ScriptedCatalog {
    fn set_autocommit(&mut self, enabled: bool) -> Result<(), ConnectionError> {
        self.state.borrow_mut().autocommit = enabled;
        Ok(())
    }

    fn execute(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64, ConnectionError> {
        self.check_failure(statement)?;
        let mut state = self.state.borrow_mut();
        if statement == UPDATE_SCHEMA_VERSION {
            let value = params.first().cloned().unwrap_or(SqlValue::Null);
            let rows = state.pending.as_ref().unwrap_or(&state.committed).len();
            state.pending = Some(vec![value; rows]);
            return Ok(rows as u64);
        }
        state
            .executed
            .push((statement.to_owned(), params.to_vec()));
        Ok(1)
    }

    fn query(&mut self, statement: &str, _params: &[SqlValue]) -> Result<Vec<Row>, ConnectionError> {
        self.check_failure(statement)?;
        let state = self.state.borrow();
        if statement == SELECT_SCHEMA_VERSION {
            let rows = state.pending.as_ref().unwrap_or(&state.committed);
            return Ok(rows.iter().cloned().map(|value| vec![value]).collect());
        }
        Ok(state.query_rows.get(statement).cloned().unwrap_or_default())
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        let mut state = self.state.borrow_mut();
        if let Some(pending) = state.pending.take() {
            let version = pending.first().and_then(SqlValue::as_text).unwrap_or_default();
            state.committed = pending;
            state.committed_versions.push(version);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        let mut state = self.state.borrow_mut();
        state.pending = None;
        state.rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}

/// Connector handing out clones of one [`ScriptedCatalog`].
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    catalog: ScriptedCatalog,
}

impl ScriptedConnector {
    /// Wraps `catalog`.
    #[must_use]
    pub const fn new(catalog: ScriptedCatalog) -> Self {
        Self { catalog }
    }
}

impl CatalogConnector for ScriptedConnector {
    fn prepare(&self, _settings: &DatabaseSettings) -> Result<(), ConnectionError> {
        self.catalog.state.borrow_mut().prepared += 1;
        Ok(())
    }

    fn open(
        &self,
        _settings: &DatabaseSettings,
    ) -> Result<Box<dyn CatalogConnection>, ConnectionError> {
        let mut catalog = self.catalog.clone();
        {
            let mut state = catalog.state.borrow_mut();
            state.opened += 1;
            state.closed = false;
        }
        catalog.set_autocommit(true)?;
        Ok(Box::new(catalog))
    }
}

/// Script runner that records invocations instead of spawning processes.
#[derive(Debug, Clone, Default)]
pub struct RecordingScriptRunner {
    runs: Rc<RefCell<Vec<String>>>,
}

impl RecordingScriptRunner {
    /// Script names run so far.
    #[must_use]
    pub fn runs(&self) -> Vec<String> {
        self.runs.borrow().clone()
    }
}

impl ScriptRunner for RecordingScriptRunner {
    fn run(&self, script: &str) -> Result<(), ScriptError> {
        self.runs.borrow_mut().push(script.to_owned());
        Ok(())
    }
}
