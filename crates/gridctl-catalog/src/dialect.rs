//! Dialect-specific SQL fragments and client environment.
//!
//! The adapter is resolved once per engine and consulted by migration steps,
//! so individual steps never branch on dialect names themselves.

use std::path::Path;

use gridctl_config::{DatabaseSettings, Dialect};

/// Portable column types used by migration steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit integer.
    BigInt,
    /// Variable-length character data with a maximum length.
    VarChar(u16),
    /// Large character object.
    Text,
}

/// A fully rendered vendor client invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorCommand {
    /// Client executable.
    pub program: String,
    /// Arguments, script reference included.
    pub args: Vec<String>,
    /// Variables set for the client process only.
    pub environment: Vec<(String, String)>,
}

/// Dialect-specific renderer resolved once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectAdapter {
    dialect: Dialect,
}

impl DialectAdapter {
    /// Resolves the adapter for `dialect`.
    #[must_use]
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// The dialect this adapter renders for.
    #[must_use]
    pub const fn dialect(self) -> Dialect {
        self.dialect
    }

    /// Renders a column type.
    #[must_use]
    pub fn column_type(self, column: ColumnType) -> String {
        match (self.dialect, column) {
            (Dialect::Oracle, ColumnType::BigInt) => String::from("integer"),
            (_, ColumnType::BigInt) => String::from("bigint"),
            (Dialect::Oracle, ColumnType::VarChar(len)) => format!("varchar2({len})"),
            (_, ColumnType::VarChar(len)) => format!("varchar({len})"),
            (Dialect::Oracle, ColumnType::Text) => String::from("clob"),
            (Dialect::MySql, ColumnType::Text) => String::from("longtext"),
            (_, ColumnType::Text) => String::from("text"),
        }
    }

    /// Renders an `ALTER TABLE ... ADD` statement for one column.
    #[must_use]
    pub fn add_column(self, table: &str, column: &str, column_type: ColumnType) -> String {
        let rendered = self.column_type(column_type);
        match self.dialect {
            Dialect::Oracle => format!("ALTER TABLE {table} ADD ({column} {rendered})"),
            Dialect::MySql => format!("ALTER TABLE {table} ADD COLUMN {column} {rendered}"),
            Dialect::Postgres | Dialect::CockroachDb => {
                format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {column} {rendered}")
            }
        }
    }

    /// Renders a `CREATE INDEX` statement.
    #[must_use]
    pub fn create_index(self, name: &str, table: &str, columns: &[&str]) -> String {
        let columns = columns.join(", ");
        match self.dialect {
            Dialect::Postgres | Dialect::CockroachDb => {
                format!("CREATE INDEX IF NOT EXISTS {name} ON {table} ({columns})")
            }
            Dialect::MySql | Dialect::Oracle => {
                format!("CREATE INDEX {name} ON {table} ({columns})")
            }
        }
    }

    /// Renders a `CREATE TABLE` statement from `(name, type, nullable)` columns.
    #[must_use]
    pub fn create_table(self, table: &str, columns: &[(&str, ColumnType, bool)]) -> String {
        let body = columns
            .iter()
            .map(|(name, column_type, nullable)| {
                let null = if *nullable { "" } else { " NOT NULL" };
                format!("{name} {}{null}", self.column_type(*column_type))
            })
            .collect::<Vec<_>>()
            .join(", ");
        match self.dialect {
            Dialect::MySql => format!("CREATE TABLE {table} ({body}) ENGINE=InnoDB"),
            Dialect::Oracle => format!("CREATE TABLE {table} ({body})"),
            Dialect::Postgres | Dialect::CockroachDb => {
                format!("CREATE TABLE IF NOT EXISTS {table} ({body})")
            }
        }
    }

    /// Environment variables the catalog client libraries expect in the
    /// service process.
    #[must_use]
    pub fn client_environment(self, settings: &DatabaseSettings) -> Vec<(String, String)> {
        match self.dialect {
            Dialect::Oracle => vec![(
                String::from("TWO_TASK"),
                format!("{}:{}/{}", settings.host, settings.port, settings.name),
            )],
            Dialect::MySql => vec![
                (String::from("MYSQL_HOST"), settings.host.clone()),
                (String::from("MYSQL_TCP_PORT"), settings.port.to_string()),
            ],
            Dialect::Postgres | Dialect::CockroachDb => vec![
                (String::from("PGHOST"), settings.host.clone()),
                (String::from("PGPORT"), settings.port.to_string()),
            ],
        }
    }

    /// Command-line client used to run vendor scripts.
    #[must_use]
    pub const fn vendor_client(self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "psql",
            Dialect::CockroachDb => "cockroach",
            Dialect::MySql => "mysql",
            Dialect::Oracle => "sqlplus",
        }
    }

    /// Renders the client invocation that executes `script` against the
    /// catalog described by `settings`.
    ///
    /// Passwords travel through the client's environment variable where the
    /// client has one. `sqlplus` only accepts them in the logon argument.
    #[must_use]
    pub fn script_command(self, settings: &DatabaseSettings, script: &Path) -> VendorCommand {
        let script = script.display().to_string();
        let mut environment = self.client_environment(settings);
        let args = match self.dialect {
            Dialect::Postgres => {
                push_secret(&mut environment, "PGPASSWORD", &settings.password);
                vec![
                    String::from("--no-psqlrc"),
                    String::from("--quiet"),
                    String::from("--set=ON_ERROR_STOP=1"),
                    format!("--username={}", settings.user),
                    format!("--dbname={}", settings.name),
                    format!("--file={script}"),
                ]
            }
            Dialect::CockroachDb => vec![
                String::from("sql"),
                format!("--host={}", settings.host),
                format!("--port={}", settings.port),
                format!("--user={}", settings.user),
                format!("--database={}", settings.name),
                format!("--file={script}"),
            ],
            Dialect::MySql => {
                push_secret(&mut environment, "MYSQL_PWD", &settings.password);
                vec![
                    format!("--host={}", settings.host),
                    format!("--port={}", settings.port),
                    format!("--user={}", settings.user),
                    format!("--database={}", settings.name),
                    format!("--execute=source {script}"),
                ]
            }
            Dialect::Oracle => {
                let logon = if settings.password.is_empty() {
                    settings.user.clone()
                } else {
                    format!("{}/{}", settings.user, settings.password)
                };
                vec![
                    String::from("-S"),
                    String::from("-L"),
                    logon,
                    format!("@{script}"),
                ]
            }
        };
        VendorCommand {
            program: self.vendor_client().to_owned(),
            args,
            environment,
        }
    }
}

fn push_secret(environment: &mut Vec<(String, String)>, key: &str, secret: &str) {
    if !secret.is_empty() {
        environment.push((key.to_owned(), secret.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use gridctl_config::Config;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::postgres(Dialect::Postgres, "varchar(250)")]
    #[case::mysql(Dialect::MySql, "varchar(250)")]
    #[case::oracle(Dialect::Oracle, "varchar2(250)")]
    #[case::cockroach(Dialect::CockroachDb, "varchar(250)")]
    fn renders_varchar(#[case] dialect: Dialect, #[case] expected: &str) {
        let adapter = DialectAdapter::new(dialect);
        assert_eq!(adapter.column_type(ColumnType::VarChar(250)), expected);
    }

    #[test]
    fn oracle_wraps_added_columns() {
        let sql = DialectAdapter::new(Dialect::Oracle).add_column(
            "data_objects",
            "access_ts",
            ColumnType::VarChar(32),
        );
        assert_eq!(sql, "ALTER TABLE data_objects ADD (access_ts varchar2(32))");
    }

    #[test]
    fn oracle_environment_combines_host_port_and_service() {
        let settings = Config {
            database_dialect: Dialect::Oracle,
            database_host: String::from("db01"),
            database_port: 1521,
            database_name: String::from("ORCL"),
            ..Config::default()
        }
        .database();
        let environment = DialectAdapter::new(Dialect::Oracle).client_environment(&settings);
        assert_eq!(
            environment,
            vec![(String::from("TWO_TASK"), String::from("db01:1521/ORCL"))]
        );
    }

    #[test]
    fn postgres_indexes_are_idempotent() {
        let sql = DialectAdapter::new(Dialect::Postgres).create_index(
            "idx_data_objects_coll",
            "data_objects",
            &["coll_id", "data_name"],
        );
        assert_eq!(
            sql,
            "CREATE INDEX IF NOT EXISTS idx_data_objects_coll ON data_objects (coll_id, data_name)"
        );
    }

    fn settings(dialect: Dialect) -> DatabaseSettings {
        Config {
            database_dialect: dialect,
            database_host: String::from("db01"),
            database_port: 5432,
            database_name: String::from("ICAT"),
            database_user: String::from("grid"),
            database_password: String::from("s3cret"),
            ..Config::default()
        }
        .database()
    }

    #[test]
    fn psql_runs_the_script_as_a_file_and_stops_on_error() {
        let command = DialectAdapter::new(Dialect::Postgres)
            .script_command(&settings(Dialect::Postgres), Path::new("/sql/functions.sql"));
        assert_eq!(command.program, "psql");
        assert_eq!(
            command.args,
            vec![
                "--no-psqlrc",
                "--quiet",
                "--set=ON_ERROR_STOP=1",
                "--username=grid",
                "--dbname=ICAT",
                "--file=/sql/functions.sql",
            ]
        );
        assert!(
            command
                .environment
                .contains(&(String::from("PGPASSWORD"), String::from("s3cret")))
        );
    }

    #[test]
    fn mysql_sources_the_script_and_keeps_the_password_off_the_command_line() {
        let command = DialectAdapter::new(Dialect::MySql)
            .script_command(&settings(Dialect::MySql), Path::new("/sql/mysql_functions.sql"));
        assert_eq!(command.program, "mysql");
        assert_eq!(
            command.args.last().map(String::as_str),
            Some("--execute=source /sql/mysql_functions.sql")
        );
        assert!(command.args.contains(&String::from("--database=ICAT")));
        assert!(!command.args.iter().any(|arg| arg.contains("s3cret")));
        assert!(
            command
                .environment
                .contains(&(String::from("MYSQL_PWD"), String::from("s3cret")))
        );
    }

    #[test]
    fn sqlplus_logs_on_before_running_the_script() {
        let command = DialectAdapter::new(Dialect::Oracle)
            .script_command(&settings(Dialect::Oracle), Path::new("/sql/functions.sql"));
        assert_eq!(command.program, "sqlplus");
        assert_eq!(
            command.args,
            vec!["-S", "-L", "grid/s3cret", "@/sql/functions.sql"]
        );
    }

    #[test]
    fn cockroach_uses_the_sql_subcommand() {
        let command = DialectAdapter::new(Dialect::CockroachDb)
            .script_command(&settings(Dialect::CockroachDb), Path::new("/sql/functions.sql"));
        assert_eq!(command.program, "cockroach");
        assert_eq!(command.args.first().map(String::as_str), Some("sql"));
        assert_eq!(
            command.args.last().map(String::as_str),
            Some("--file=/sql/functions.sql")
        );
    }

    #[test]
    fn empty_password_is_not_exported() {
        let settings = DatabaseSettings {
            password: String::new(),
            ..settings(Dialect::Postgres)
        };
        let command = DialectAdapter::new(Dialect::Postgres)
            .script_command(&settings, Path::new("/sql/functions.sql"));
        assert!(!command.environment.iter().any(|(key, _)| key == "PGPASSWORD"));
    }
}
