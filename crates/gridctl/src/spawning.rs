//! Service process spawning.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Starts the primary service executable.
pub trait ServiceLauncher {
    /// Spawns `binary` with `environment` added to the inherited environment and
    /// returns its pid. The child is not waited on.
    fn spawn(&self, binary: &Path, environment: &[(String, String)]) -> io::Result<u32>;
}

/// Launcher backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandServiceLauncher;

impl ServiceLauncher for CommandServiceLauncher {
    fn spawn(&self, binary: &Path, environment: &[(String, String)]) -> io::Result<u32> {
        let child = Command::new(binary)
            .envs(environment.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .spawn()?;
        Ok(child.id())
    }
}
