//! Connection seam between the migration engine and a catalog driver.
//!
//! Drivers are supplied by the embedding application. The engine only needs
//! statement execution, row retrieval, and explicit transaction control, so the
//! trait stays small enough to back with ODBC, a native client, or a test
//! double.

use std::fmt;

use gridctl_config::DatabaseSettings;
use thiserror::Error;

/// A bound statement parameter or a column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Integer column or parameter.
    Integer(i64),
    /// Character data.
    Text(String),
}

impl SqlValue {
    /// Builds a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns the textual form used when the value is read back as a string.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Integer(value) => Some(value.to_string()),
            Self::Text(value) => Some(value.clone()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => formatter.write_str("NULL"),
            Self::Integer(value) => write!(formatter, "{value}"),
            Self::Text(value) => write!(formatter, "'{value}'"),
        }
    }
}

/// One result row.
pub type Row = Vec<SqlValue>;

/// Errors reported by catalog drivers.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The driver could not establish a connection.
    #[error("failed to connect to catalog at {host}:{port}: {message}")]
    Connect {
        /// Catalog host.
        host: String,
        /// Catalog port.
        port: u16,
        /// Driver diagnostic.
        message: String,
    },
    /// A statement failed.
    #[error("statement failed: {message} (statement: {statement})")]
    Statement {
        /// Statement text as submitted.
        statement: String,
        /// Driver diagnostic.
        message: String,
    },
    /// Commit, rollback, or autocommit toggling failed.
    #[error("transaction control failed: {message}")]
    Transaction {
        /// Driver diagnostic.
        message: String,
    },
    /// Driver registration (for example an ODBC DSN) failed.
    #[error("failed to register catalog driver: {message}")]
    Registration {
        /// Driver diagnostic.
        message: String,
    },
}

/// An open connection to the catalog.
pub trait CatalogConnection {
    /// Enables or disables autocommit for subsequent statements.
    ///
    /// # Errors
    ///
    /// Returns the driver's failure.
    fn set_autocommit(&mut self, enabled: bool) -> Result<(), ConnectionError>;

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns the driver's failure.
    fn execute(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64, ConnectionError>;

    /// Executes a query and fetches every row.
    ///
    /// # Errors
    ///
    /// Returns the driver's failure.
    fn query(&mut self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, ConnectionError>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver's failure.
    fn commit(&mut self) -> Result<(), ConnectionError>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver's failure.
    fn rollback(&mut self) -> Result<(), ConnectionError>;

    /// Releases the connection. Further calls are undefined.
    ///
    /// # Errors
    ///
    /// Returns the driver's failure.
    fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Factory for catalog connections.
pub trait CatalogConnector {
    /// Synchronises driver registration (such as ODBC entries) before connecting.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Registration`] when registration fails.
    fn prepare(&self, _settings: &DatabaseSettings) -> Result<(), ConnectionError> {
        Ok(())
    }

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Connect`] when the catalog is unreachable.
    fn open(&self, settings: &DatabaseSettings)
    -> Result<Box<dyn CatalogConnection>, ConnectionError>;
}

/// Owns a connection and closes it on every exit path.
pub struct Session {
    connection: Box<dyn CatalogConnection>,
    closed: bool,
}

impl Session {
    /// Opens a connection through `connector` with autocommit disabled.
    ///
    /// # Errors
    ///
    /// Fails when the connector cannot open a connection or the driver
    /// rejects the autocommit change.
    pub fn open_transactional(
        connector: &dyn CatalogConnector,
        settings: &DatabaseSettings,
    ) -> Result<Self, ConnectionError> {
        let connection = connector.open(settings)?;
        let mut session = Self::new(connection);
        session.connection().set_autocommit(false)?;
        Ok(session)
    }

    /// Wraps an already open connection.
    #[must_use]
    pub fn new(connection: Box<dyn CatalogConnection>) -> Self {
        Self {
            connection,
            closed: false,
        }
    }

    /// Borrows the underlying connection.
    pub fn connection(&mut self) -> &mut dyn CatalogConnection {
        self.connection.as_mut()
    }

    /// Closes the connection now.
    ///
    /// # Errors
    ///
    /// Returns the driver's close failure.
    pub fn close(mut self) -> Result<(), ConnectionError> {
        self.closed = true;
        self.connection.close()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(error) = self.connection.close() {
            tracing::warn!(
                target: crate::CATALOG_TARGET,
                error = %error,
                "failed to close catalog connection"
            );
        }
    }
}

/// Transaction scope that rolls back unless committed.
pub struct Transaction<'c> {
    connection: &'c mut dyn CatalogConnection,
    finished: bool,
}

impl<'c> Transaction<'c> {
    /// Starts a scope on a connection whose autocommit is already disabled.
    pub fn begin(connection: &'c mut dyn CatalogConnection) -> Self {
        Self {
            connection,
            finished: false,
        }
    }

    /// Borrows the connection for statements inside the scope.
    pub fn connection(&mut self) -> &mut dyn CatalogConnection {
        &mut *self.connection
    }

    /// Commits the scope.
    ///
    /// # Errors
    ///
    /// Returns the driver's commit failure.
    pub fn commit(mut self) -> Result<(), ConnectionError> {
        self.finished = true;
        self.connection.commit()
    }

    /// Rolls the scope back explicitly.
    ///
    /// # Errors
    ///
    /// Returns the driver's rollback failure.
    pub fn rollback(mut self) -> Result<(), ConnectionError> {
        self.finished = true;
        self.connection.rollback()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(error) = self.connection.rollback() {
            tracing::warn!(
                target: crate::CATALOG_TARGET,
                error = %error,
                "failed to roll back abandoned catalog transaction"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::mock;
    use mockall::predicate::eq;

    use super::*;

    mock! {
        Connection {}
        impl CatalogConnection for Connection {
            fn set_autocommit(&mut self, enabled: bool) -> Result<(), ConnectionError>;
            fn execute(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64, ConnectionError>;
            fn query(&mut self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, ConnectionError>;
            fn commit(&mut self) -> Result<(), ConnectionError>;
            fn rollback(&mut self) -> Result<(), ConnectionError>;
            fn close(&mut self) -> Result<(), ConnectionError>;
        }
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut connection = MockConnection::new();
        connection.expect_rollback().once().returning(|| Ok(()));
        connection.expect_commit().never();
        {
            let _scope = Transaction::begin(&mut connection);
        }
        connection.checkpoint();
    }

    #[test]
    fn committed_transaction_does_not_roll_back() {
        let mut connection = MockConnection::new();
        connection.expect_commit().once().returning(|| Ok(()));
        connection.expect_rollback().never();
        Transaction::begin(&mut connection)
            .commit()
            .expect("commit succeeds");
    }

    #[test]
    fn dropped_session_closes_exactly_once() {
        let mut connection = MockConnection::new();
        connection.expect_close().once().returning(|| Ok(()));
        drop(Session::new(Box::new(connection)));
    }

    #[test]
    fn explicit_close_is_not_repeated_on_drop() {
        let mut connection = MockConnection::new();
        connection.expect_close().once().returning(|| Ok(()));
        Session::new(Box::new(connection))
            .close()
            .expect("close succeeds");
    }

    #[test]
    fn transactional_session_disables_autocommit() {
        struct Connector;
        impl CatalogConnector for Connector {
            fn open(
                &self,
                _settings: &DatabaseSettings,
            ) -> Result<Box<dyn CatalogConnection>, ConnectionError> {
                let mut connection = MockConnection::new();
                connection
                    .expect_set_autocommit()
                    .with(eq(false))
                    .once()
                    .returning(|_| Ok(()));
                connection.expect_close().returning(|| Ok(()));
                Ok(Box::new(connection))
            }
        }

        let settings = gridctl_config::Config::default().database();
        let session = Session::open_transactional(&Connector, &settings).expect("open session");
        drop(session);
    }
}
