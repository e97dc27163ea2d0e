//! Layered configuration for the Corral plugin tools.
//!
//! # Usage
//!
//! ```rust,no_run
//! use corral_config::Config;
//!
//! let resolved = Config::load(None).unwrap();
//! println!("plugins live under {}", resolved.config.paths.libexec_dir.display());
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`CORRAL_LIBEXECDIR`, `CORRAL_LOG`)
//! 2. **User** (`~/.corral/config.toml`, or `$CORRAL_HOME/config.toml`)
//! 3. **System** (`/etc/corral/config.toml`)
//! 4. **Embedded defaults** (`defaults.toml` compiled into binary)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ResolvedConfig, Sources};
pub use types::*;

impl Config {
    /// Load configuration with full precedence chain.
    ///
    /// `home_override` replaces the directory searched for `config.toml`
    /// at the user layer.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the
    /// result fails validation.
    pub fn load(home_override: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(home_override)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns the serializer message if rendering fails.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }
}
