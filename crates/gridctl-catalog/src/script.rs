//! Vendor client execution for migration steps that ship SQL scripts.

use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use gridctl_config::DatabaseSettings;
use thiserror::Error;

use crate::dialect::DialectAdapter;

/// Runs vendor scripts referenced by migration steps.
pub trait ScriptRunner {
    /// Runs `script` against the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] when the client cannot be launched or exits
    /// unsuccessfully.
    fn run(&self, script: &str) -> Result<(), ScriptError>;
}

/// Errors raised while running a vendor script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The client could not be launched.
    #[error("failed to launch '{client}' for script {script:?}: {source}")]
    Launch {
        /// Vendor client binary.
        client: String,
        /// Script path.
        script: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The client exited unsuccessfully.
    #[error("'{client}' failed on script {script:?} (status: {exit_status:?})")]
    Failed {
        /// Vendor client binary.
        client: String,
        /// Script path.
        script: PathBuf,
        /// Exit code, when the client exited normally.
        exit_status: Option<i32>,
    },
}

/// Runner that spawns the dialect's command-line client.
#[derive(Debug, Clone)]
pub struct SystemScriptRunner {
    script_dir: PathBuf,
    adapter: DialectAdapter,
    settings: DatabaseSettings,
    client: Option<String>,
}

impl SystemScriptRunner {
    /// Builds a runner resolving scripts relative to `script_dir`.
    pub fn new(
        script_dir: impl Into<PathBuf>,
        adapter: DialectAdapter,
        settings: DatabaseSettings,
    ) -> Self {
        Self {
            script_dir: script_dir.into(),
            adapter,
            settings,
            client: None,
        }
    }

    /// Runs `client` in place of the dialect's default executable name.
    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }
}

impl ScriptRunner for SystemScriptRunner {
    fn run(&self, script: &str) -> Result<(), ScriptError> {
        let path = self.script_dir.join(script);
        let mut command = self.adapter.script_command(&self.settings, &path);
        if let Some(client) = &self.client {
            command.program.clone_from(client);
        }
        tracing::info!(
            target: crate::MIGRATE_TARGET,
            client = %command.program,
            script = %path.display(),
            "running vendor script"
        );
        let status = Command::new(&command.program)
            .args(&command.args)
            .envs(command.environment.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .status()
            .map_err(|source| ScriptError::Launch {
                client: command.program.clone(),
                script: path.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ScriptError::Failed {
                client: command.program,
                script: path,
                exit_status: status.code(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use gridctl_config::{Config, Dialect};
    use tempfile::TempDir;

    use super::*;

    fn settings() -> DatabaseSettings {
        Config {
            database_dialect: Dialect::Postgres,
            database_host: String::from("db01"),
            database_port: 5433,
            database_name: String::from("ICAT"),
            database_user: String::from("grid"),
            database_password: String::from("s3cret"),
            ..Config::default()
        }
        .database()
    }

    fn runner(script_dir: &Path) -> SystemScriptRunner {
        SystemScriptRunner::new(script_dir, DialectAdapter::new(Dialect::Postgres), settings())
    }

    /// Writes a client that records its arguments and selected environment.
    fn recording_client(dir: &Path) -> PathBuf {
        let client = dir.join("fake-psql");
        let log = dir.join("client.log");
        fs::write(
            &client,
            format!(
                "#!/bin/sh\nfor arg in \"$@\"; do echo \"arg:$arg\"; done > {log}\n\
                 echo \"env:$PGHOST:$PGPORT:$PGPASSWORD\" >> {log}\n",
                log = log.display()
            ),
        )
        .expect("write client");
        fs::set_permissions(&client, fs::Permissions::from_mode(0o755)).expect("chmod client");
        client
    }

    #[test]
    fn client_receives_the_script_as_a_file_with_credentials() {
        let dir = TempDir::new().expect("temp dir");
        let client = recording_client(dir.path());

        runner(dir.path())
            .with_client(client.display().to_string())
            .run("functions.sql")
            .expect("client succeeds");

        let log = fs::read_to_string(dir.path().join("client.log")).expect("read log");
        let script = dir.path().join("functions.sql");
        let expected = [
            String::from("arg:--no-psqlrc"),
            String::from("arg:--quiet"),
            String::from("arg:--set=ON_ERROR_STOP=1"),
            String::from("arg:--username=grid"),
            String::from("arg:--dbname=ICAT"),
            format!("arg:--file={}", script.display()),
            String::from("env:db01:5433:s3cret"),
        ];
        assert_eq!(log.lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn missing_client_is_a_launch_error() {
        let error = runner(Path::new("/nonexistent"))
            .with_client("/nonexistent/gridctl-client")
            .run("functions.sql")
            .expect_err("client is missing");
        assert!(matches!(error, ScriptError::Launch { .. }));
    }

    #[test]
    fn failing_client_reports_exit_status() {
        let error = runner(Path::new("/tmp"))
            .with_client("false")
            .run("functions.sql")
            .expect_err("client fails");
        match error {
            ScriptError::Failed { exit_status, .. } => assert_eq!(exit_status, Some(1)),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
