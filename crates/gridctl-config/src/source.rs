//! Configuration sources and the refreshable store handed to lifecycle operations.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};

use crate::Config;

/// Abstraction over configuration loading so tests can inject fixed values.
pub trait ConfigSource {
    /// Loads a fresh configuration snapshot.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Source that delegates to the layered [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigSource;

impl ConfigSource for SystemConfigSource {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Source that always yields the same configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigSource {
    config: Config,
}

impl StaticConfigSource {
    /// Wraps a pre-built configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

impl<T> ConfigSource for &T
where
    T: ConfigSource + ?Sized,
{
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        (**self).load()
    }
}

/// Cached configuration with explicit invalidation.
///
/// `current` loads lazily and reuses the cached snapshot; `refresh` discards it
/// and reloads. Lifecycle operations call `refresh` once before acting.
#[derive(Debug)]
pub struct ConfigStore<S> {
    source: S,
    cached: Option<Config>,
}

impl<S: ConfigSource> ConfigStore<S> {
    /// Builds an empty store over `source`.
    pub const fn new(source: S) -> Self {
        Self {
            source,
            cached: None,
        }
    }

    /// Returns the cached configuration, loading it on first use.
    ///
    /// # Errors
    ///
    /// Propagates the source's load failure.
    pub fn current(&mut self) -> Result<&Config, Arc<OrthoError>> {
        if let Some(config) = self.cached.take() {
            return Ok(self.cached.insert(config));
        }
        self.refresh()
    }

    /// Drops any cached value and reloads from the source.
    ///
    /// # Errors
    ///
    /// Propagates the source's load failure; the cache stays empty.
    pub fn refresh(&mut self) -> Result<&Config, Arc<OrthoError>> {
        self.cached = None;
        let config = self.source.load()?;
        Ok(self.cached.insert(config))
    }

    /// Discards the cached value without reloading.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
