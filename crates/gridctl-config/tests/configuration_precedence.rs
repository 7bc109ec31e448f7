use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use tempfile::TempDir;

use gridctl_config::{Config, DEFAULT_SERVICE_PORT, Dialect, LogFormat};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    _guard: MutexGuard<'static, ()>,
}

fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = lock_env();
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in edition 2024; the guard restores
        // the previous value on drop so other tests see a clean environment.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

fn write_config(dir: &TempDir, body: &str) -> OsString {
    let path = dir.path().join("gridctl.toml");
    fs::write(&path, body).expect("write configuration");
    path.into_os_string()
}

fn args_with_config(path: &OsString) -> Vec<OsString> {
    vec![
        OsString::from("gridctl"),
        OsString::from("--config-path"),
        path.clone(),
    ]
}

#[test]
fn built_in_defaults_apply_without_overrides() {
    let _lock = lock_env();
    let config =
        Config::load_from_iter([OsString::from("gridctl")]).expect("load default configuration");
    assert_eq!(config.service_port(), DEFAULT_SERVICE_PORT);
    assert_eq!(config.log_format(), LogFormat::Json);
    assert_eq!(config.database_dialect, Dialect::Postgres);
    assert!(!config.catalog_host);
}

#[test]
fn file_values_override_defaults() {
    let _lock = lock_env();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        "service_port = 4000\ndatabase_dialect = \"oracle\"\ncatalog_host = true\n",
    );

    let config = Config::load_from_iter(args_with_config(&path)).expect("load file config");
    assert_eq!(config.service_port(), 4000);
    assert_eq!(config.database_dialect, Dialect::Oracle);
    assert!(config.catalog_host);
}

#[test]
fn environment_overrides_file_and_cli_overrides_environment() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "service_port = 4000\n");
    let _env = EnvOverride::set_var("GRIDCTL_SERVICE_PORT", OsStr::new("4100"));

    let from_env = Config::load_from_iter(args_with_config(&path)).expect("load env config");
    assert_eq!(from_env.service_port(), 4100);

    let mut args = args_with_config(&path);
    args.push(OsString::from("--service-port"));
    args.push(OsString::from("4200"));
    let from_cli = Config::load_from_iter(args).expect("load cli config");
    assert_eq!(from_cli.service_port(), 4200);
}

#[test]
fn malformed_file_fails_to_load() {
    let _lock = lock_env();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "service_port = \"not a port\"\n");
    let error = Config::load_from_iter(args_with_config(&path)).expect_err("loading must fail");
    assert!(
        !error.to_string().is_empty(),
        "expected a descriptive configuration error"
    );
    assert!(Path::new(&path).exists());
}
