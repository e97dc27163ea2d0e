//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Accepted values for `logging.level`.
pub const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Accepted values for `logging.format`.
pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_paths(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_paths(config: &Config) -> ConfigResult<()> {
    let libexec = &config.paths.libexec_dir;
    if !libexec.is_absolute() {
        return Err(ConfigError::ValidationError {
            field: "paths.libexec_dir".to_owned(),
            message: format!("'{}' must be an absolute path", libexec.display()),
        });
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let logging = &config.logging;

    if !LOG_LEVELS.contains(&logging.level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unknown level '{}'; expected one of: {}",
                logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if !LOG_FORMATS.contains(&logging.format.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unknown format '{}'; expected one of: {}",
                logging.format,
                LOG_FORMATS.join(", ")
            ),
        });
    }

    if let Some(pos) = logging.directives.iter().position(|d| d.trim().is_empty()) {
        return Err(ConfigError::ValidationError {
            field: format!("logging.directives[{pos}]"),
            message: "directive must not be empty".to_owned(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::{LoggingSection, PathsSection};

    fn config() -> Config {
        Config {
            paths: PathsSection {
                libexec_dir: PathBuf::from("/usr/local/libexec/corral"),
            },
            logging: LoggingSection {
                level: "info".to_owned(),
                format: "compact".to_owned(),
                directives: vec!["corral_plugins=debug".to_owned()],
            },
        }
    }

    fn invalid_field(config: &Config) -> String {
        match validate(config) {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&config()).is_ok());
    }

    #[test]
    fn test_relative_libexec_rejected() {
        let mut c = config();
        c.paths.libexec_dir = PathBuf::from("libexec");
        assert_eq!(invalid_field(&c), "paths.libexec_dir");
    }

    #[test]
    fn test_unknown_level_rejected() {
        let mut c = config();
        c.logging.level = "loud".to_owned();
        assert_eq!(invalid_field(&c), "logging.level");
    }

    #[test]
    fn test_level_is_case_insensitive() {
        let mut c = config();
        c.logging.level = "DEBUG".to_owned();
        assert!(validate(&c).is_ok());
    }

    #[test]
    fn test_unknown_format_rejected() {
        let mut c = config();
        c.logging.format = "xml".to_owned();
        assert_eq!(invalid_field(&c), "logging.format");
    }

    #[test]
    fn test_blank_directive_rejected() {
        let mut c = config();
        c.logging.directives.push("  ".to_owned());
        assert_eq!(invalid_field(&c), "logging.directives[1]");
    }
}
