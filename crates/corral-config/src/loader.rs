//! Config file discovery and layered loading.
//!
//! Layers, lowest precedence first:
//! 1. `defaults.toml` embedded in the binary
//! 2. `/etc/corral/config.toml` (system)
//! 3. `~/.corral/config.toml`, or `$CORRAL_HOME/config.toml` when set (user)
//! 4. `CORRAL_LIBEXECDIR` and `CORRAL_LOG` environment overrides
//!
//! Tables merge per key; scalars and arrays from a higher layer replace the
//! lower value. The merged tree is deserialized and validated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/corral/config.toml";

/// Overrides `paths.libexec_dir`.
pub const ENV_LIBEXECDIR: &str = "CORRAL_LIBEXECDIR";
/// Overrides `logging.level`.
pub const ENV_LOG: &str = "CORRAL_LOG";
/// Directory holding the user config file.
pub const ENV_HOME: &str = "CORRAL_HOME";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Config files that contributed, lowest precedence first.
    pub loaded_files: Vec<String>,
    /// Environment variables that overrode a value.
    pub env_overrides: Vec<String>,
}

/// Where [`load_layers`] reads each layer from.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    /// System config file, skipped when `None` or missing.
    pub system: Option<PathBuf>,
    /// User config file, skipped when `None` or missing.
    pub user: Option<PathBuf>,
    /// Environment snapshot consulted for overrides.
    pub env: HashMap<String, String>,
}

impl Sources {
    /// The standard sources for this process: the system file, the user file
    /// under `home_override` (or the discovered home), and the current
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDir`] if no user config location can be
    /// determined.
    pub fn discover(home_override: Option<&Path>) -> ConfigResult<Self> {
        let env: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("CORRAL_"))
            .collect();
        let user_dir = match (home_override, env.get(ENV_HOME)) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(dir)) if !dir.is_empty() => PathBuf::from(dir),
            _ => home_directory()?.join(".corral"),
        };
        Ok(Self {
            system: Some(PathBuf::from(SYSTEM_CONFIG_PATH)),
            user: Some(user_dir.join("config.toml")),
            env,
        })
    }
}

/// Load configuration with the standard layer discovery.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// merged configuration fails validation.
pub fn load(home_override: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_layers(&Sources::discover(home_override)?)
}

/// Load configuration from explicit sources.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// merged configuration fails validation.
pub fn load_layers(sources: &Sources) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut loaded_files = Vec::new();

    for (layer, path) in [("system", &sources.system), ("user", &sources.user)] {
        let Some(path) = path else { continue };
        if let Some(overlay) = try_load_file(path)? {
            deep_merge(&mut merged, &overlay);
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), layer, "loaded config file");
        }
    }

    let env_overrides = apply_env_overrides(&mut merged, &sources.env);
    if !env_overrides.is_empty() {
        debug!(vars = ?env_overrides, "applied environment overrides");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        loaded_files,
        env_overrides,
    })
}

/// Recursively deep-merge `overlay` into `base`.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

/// Apply environment overrides, returning the names of the variables used.
fn apply_env_overrides(merged: &mut toml::Value, env: &HashMap<String, String>) -> Vec<String> {
    let mut applied = Vec::new();
    for (var, section, key) in [
        (ENV_LIBEXECDIR, "paths", "libexec_dir"),
        (ENV_LOG, "logging", "level"),
    ] {
        let Some(value) = env.get(var).filter(|v| !v.is_empty()) else {
            continue;
        };
        let mut overlay = toml::Table::new();
        let mut inner = toml::Table::new();
        inner.insert(key.to_owned(), toml::Value::String(value.clone()));
        overlay.insert(section.to_owned(), toml::Value::Table(inner));
        deep_merge(merged, &toml::Value::Table(overlay));
        applied.push(var.to_owned());
    }
    applied
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(
            config.paths.libexec_dir,
            PathBuf::from("/usr/local/libexec/corral")
        );
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "compact");
        assert!(config.logging.directives.is_empty());
    }

    #[test]
    fn test_no_files_uses_defaults() {
        let resolved = load_layers(&Sources::default()).unwrap();
        assert_eq!(resolved.config, toml::from_str(DEFAULTS_TOML).unwrap());
        assert!(resolved.loaded_files.is_empty());
        assert!(resolved.env_overrides.is_empty());
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sources = Sources {
            system: Some(dir.path().join("absent-system.toml")),
            user: Some(dir.path().join("absent-user.toml")),
            env: HashMap::new(),
        };
        assert!(load_layers(&sources).unwrap().loaded_files.is_empty());
    }

    #[test]
    fn test_user_overrides_system_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let system = write(
            dir.path(),
            "system.toml",
            "[paths]\nlibexec_dir = \"/opt/system\"\n[logging]\nlevel = \"info\"\n",
        );
        let user = write(dir.path(), "user.toml", "[logging]\nlevel = \"debug\"\n");

        let resolved = load_layers(&Sources {
            system: Some(system),
            user: Some(user),
            env: HashMap::new(),
        })
        .unwrap();
        assert_eq!(resolved.config.paths.libexec_dir, PathBuf::from("/opt/system"));
        assert_eq!(resolved.config.logging.level, "debug");
        assert_eq!(resolved.config.logging.format, "compact");
        assert_eq!(resolved.loaded_files.len(), 2);
    }

    #[test]
    fn test_env_overrides_files() {
        let dir = tempfile::tempdir().unwrap();
        let user = write(dir.path(), "user.toml", "[paths]\nlibexec_dir = \"/opt/user\"\n");
        let env = HashMap::from([
            (ENV_LIBEXECDIR.to_owned(), "/opt/env".to_owned()),
            (ENV_LOG.to_owned(), "trace".to_owned()),
        ]);

        let resolved = load_layers(&Sources {
            system: None,
            user: Some(user),
            env,
        })
        .unwrap();
        assert_eq!(resolved.config.paths.libexec_dir, PathBuf::from("/opt/env"));
        assert_eq!(resolved.config.logging.level, "trace");
        assert_eq!(resolved.env_overrides, [ENV_LIBEXECDIR, ENV_LOG]);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let env = HashMap::from([(ENV_LIBEXECDIR.to_owned(), String::new())]);
        let resolved = load_layers(&Sources {
            env,
            ..Sources::default()
        })
        .unwrap();
        assert!(resolved.env_overrides.is_empty());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let user = write(dir.path(), "user.toml", "[paths\nlibexec_dir = 3");
        let err = load_layers(&Sources {
            user: Some(user),
            ..Sources::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let user = write(dir.path(), "user.toml", "[logging]\ndirectives = \"x\"\n");
        let err = load_layers(&Sources {
            user: Some(user),
            ..Sources::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { path, .. } if path == "<merged config>"));
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let padding = "#".repeat(1_100_000);
        let user = write(dir.path(), "user.toml", &padding);
        let err = load_layers(&Sources {
            user: Some(user),
            ..Sources::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn test_home_override_locates_user_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.toml", "[logging]\nformat = \"json\"\n");
        let mut sources = Sources::discover(Some(dir.path())).unwrap();
        sources.system = None;
        sources.env.clear();
        let resolved = load_layers(&sources).unwrap();
        assert_eq!(resolved.config.logging.format, "json");
    }
}
