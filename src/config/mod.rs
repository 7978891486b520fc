//! Runtime configuration (TOML)
//!
//! ```toml
//! [logging]
//! level = "debug"
//! json = false
//!
//! [caches]
//! initial_capacity = 64
//! sweep_interval = 256
//!
//! [interop]
//! variance_entries = true
//! capture_context = true
//! ```

use crate::errors::{ProjectionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub caches: CacheSection,

    #[serde(default)]
    pub interop: InteropSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default = "default_false")]
    pub show_spans: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    /// Initial capacity of each per-type / per-name cache
    #[serde(default = "default_capacity")]
    pub initial_capacity: usize,

    /// Registry insertions between opportunistic sweeps (0 disables)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteropSection {
    /// Emit variance-compatible generic instantiations in interface tables
    #[serde(default = "default_true")]
    pub variance_entries: bool,

    /// Capture an execution context for context-bound references
    #[serde(default = "default_true")]
    pub capture_context: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
            show_spans: false,
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            initial_capacity: default_capacity(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for InteropSection {
    fn default() -> Self {
        Self {
            variance_entries: true,
            capture_context: true,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_level() -> String { "info".to_string() }
fn default_capacity() -> usize { 64 }
fn default_sweep_interval() -> usize { 256 }

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ProjectionError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ProjectionError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ProjectionError::Config(e.to_string()))
    }
}
