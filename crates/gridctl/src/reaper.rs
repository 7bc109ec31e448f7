//! Removal of shared-memory cache files left behind by force-killed processes.

use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use glob::Pattern;
use tracing::{debug, info};

use crate::error::LifecycleWarning;

/// Files removed and problems met while reaping one pid.
#[derive(Debug, Default)]
pub struct ReapReport {
    /// Files deleted.
    pub removed: Vec<PathBuf>,
    /// Per-file failures; none of them abort the reap.
    pub warnings: Vec<LifecycleWarning>,
}

/// Deletes cache artefacts embedding a process id.
#[cfg_attr(test, mockall::automock)]
pub trait CacheReaper {
    /// Removes every cache file belonging to `pid`. Never fails.
    fn reap(&self, pid: u32) -> ReapReport;
}

/// Reaper scanning a fixed set of shared-memory directories.
#[derive(Debug, Clone)]
pub struct SharedMemoryReaper {
    directories: Vec<Utf8PathBuf>,
}

impl SharedMemoryReaper {
    /// Scans `directories`; missing ones are skipped.
    #[must_use]
    pub const fn new(directories: Vec<Utf8PathBuf>) -> Self {
        Self { directories }
    }

    /// Lists entries of `directory` mentioning `pid`. Directories that exist
    /// but cannot be read become warnings on `report`.
    fn candidates(directory: &Path, pid: &str, report: &mut ReapReport) -> Vec<PathBuf> {
        let escaped = Pattern::escape(&directory.to_string_lossy());
        let pattern = format!("{escaped}/*{pid}*");
        match glob::glob(&pattern) {
            Ok(paths) => {
                let mut found = Vec::new();
                for entry in paths {
                    match entry {
                        Ok(path) => found.push(path),
                        Err(error) => report.warnings.push(LifecycleWarning::CacheCleanup {
                            path: error.path().to_path_buf(),
                            source: error.into_error(),
                        }),
                    }
                }
                found
            }
            Err(error) => {
                debug!(
                    target: crate::REAPER_TARGET,
                    pattern,
                    error = %error,
                    "skipping unusable cache pattern"
                );
                Vec::new()
            }
        }
    }
}

impl CacheReaper for SharedMemoryReaper {
    fn reap(&self, pid: u32) -> ReapReport {
        let needle = pid.to_string();
        let mut report = ReapReport::default();
        for directory in &self.directories {
            let matches = Self::candidates(directory.as_std_path(), &needle, &mut report);
            for path in matches {
                if !file_name_embeds_pid(&path, &needle) {
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!(
                            target: crate::REAPER_TARGET,
                            pid,
                            path = %path.display(),
                            "removed cache file"
                        );
                        report.removed.push(path);
                    }
                    Err(source) => report
                        .warnings
                        .push(LifecycleWarning::CacheCleanup { path, source }),
                }
            }
        }
        report
    }
}

/// True when `pid` appears in the file name as a complete run of digits, so
/// pid `12` never claims `cache_123`.
fn file_name_embeds_pid(path: &Path, pid: &str) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| {
            name.split(|character: char| !character.is_ascii_digit())
                .any(|run| run == pid)
        })
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"cache").expect("write cache file");
        path
    }

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8Path::from_path(dir.path())
            .expect("utf-8 temp dir")
            .to_path_buf()
    }

    #[rstest]
    #[case("gridd_cache_4242", true)]
    #[case("4242.shm", true)]
    #[case("re_cache_4242_7", true)]
    #[case("gridd_cache_42420", false)]
    #[case("gridd_cache_14242", false)]
    #[case("gridd_cache", false)]
    fn pid_must_be_a_whole_digit_run(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(file_name_embeds_pid(Path::new(name), "4242"), expected);
    }

    #[test]
    fn removes_matching_files_from_every_directory() {
        let first = TempDir::new().expect("temp dir");
        let second = TempDir::new().expect("temp dir");
        let ours = touch(first.path(), "gridd_cache_4242");
        let also_ours = touch(second.path(), "re_mutex_4242");
        let theirs = touch(first.path(), "gridd_cache_42421");
        let reaper = SharedMemoryReaper::new(vec![utf8(&first), utf8(&second)]);

        let report = reaper.reap(4242);

        assert_eq!(report.removed.len(), 2);
        assert!(report.warnings.is_empty());
        assert!(!ours.exists());
        assert!(!also_ours.exists());
        assert!(theirs.exists());
    }

    #[test]
    fn missing_directories_are_ignored() {
        let reaper = SharedMemoryReaper::new(vec![Utf8PathBuf::from(
            "/nonexistent/gridctl/shm",
        )]);
        let report = reaper.reap(4242);
        assert!(report.removed.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn undeletable_entries_become_warnings() {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir(dir.path().join("gridd_cache_4242")).expect("create dir");
        let reaper = SharedMemoryReaper::new(vec![utf8(&dir)]);

        let report = reaper.reap(4242);

        assert!(report.removed.is_empty());
        assert!(matches!(
            report.warnings.as_slice(),
            [LifecycleWarning::CacheCleanup { .. }]
        ));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directories_become_warnings() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().expect("temp dir");
        let locked = root.path().join("shm");
        fs::create_dir(&locked).expect("create shm dir");
        let cache = touch(&locked, "gridd_cache_4242");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("lock dir");
        if fs::read_dir(&locked).is_ok() {
            // Privileged users read through the mode bits.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock dir");
            return;
        }
        let reaper = SharedMemoryReaper::new(vec![
            Utf8PathBuf::from_path_buf(locked.clone()).expect("utf-8 temp dir"),
        ]);

        let report = reaper.reap(4242);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock dir");
        assert!(report.removed.is_empty());
        match report.warnings.as_slice() {
            [LifecycleWarning::CacheCleanup { path, source }] => {
                assert_eq!(path, &locked);
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected one cache cleanup warning, got {other:?}"),
        }
        assert!(cache.exists());
    }
}
