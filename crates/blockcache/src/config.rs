//! Configuration for blockcache.
//!
//! Provides the [`BlockCacheConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit config path
//! 2. `BLOCKCACHE_CONFIG` environment variable
//! 3. XDG default: `~/.config/blockcache/config.toml`
//! 4. Built-in defaults
//!
//! Environment overrides use the `BLOCKCACHE` prefix, e.g.
//! `BLOCKCACHE_CACHE_ROOT_KEY_PREFIX`.

use blockcache_core::{Error, Result};
use blockcache_graph::{BlockStructureFactory, DEFAULT_ROOT_KEY_PREFIX};
use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "BLOCKCACHE_CONFIG";

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for blockcache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockCacheConfig {
    /// Cache key layout.
    pub cache: CacheConfig,

    /// Apply-phase defaults.
    pub transform: TransformConfig,
}

/// Cache key layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix of root entry keys.
    pub root_key_prefix: String,

    /// Prefix of per-block entry keys.
    pub block_key_prefix: String,
}

/// Apply-phase defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Remove blocks left without parents by a removal.
    pub remove_orphans: bool,

    /// Transformers applied when a request names none. Empty means all
    /// registered transformers.
    pub transformers: Vec<String>,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_key_prefix: DEFAULT_ROOT_KEY_PREFIX.to_string(),
            block_key_prefix: String::new(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            remove_orphans: true,
            transformers: Vec::new(),
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl BlockCacheConfig {
    /// Load configuration from file, environment, and defaults.
    ///
    /// A config path that does not exist is skipped, leaving defaults and
    /// environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("BLOCKCACHE");
        env_opts.add_section("cache");
        env_opts.add_section("transform");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from an explicit path, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("blockcache").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// A structure factory using the configured key prefixes.
    pub fn factory(&self) -> BlockStructureFactory {
        BlockStructureFactory::new(
            self.cache.root_key_prefix.clone(),
            self.cache.block_key_prefix.clone(),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
