//! Configuration struct definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete Corral configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem locations.
    pub paths: PathsSection,
    /// Log output.
    pub logging: LoggingSection,
}

/// `[paths]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsSection {
    /// Root under which `plugin/` lives.
    pub libexec_dir: PathBuf,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default level: `trace`, `debug`, `info`, `warn`, `error` or `off`.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    /// Per-target overrides such as `corral_plugins=debug`.
    #[serde(default)]
    pub directives: Vec<String>,
}
