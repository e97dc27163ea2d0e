//! Bridge from `corral_config::Config` to the types the CLI wires up.

use std::path::PathBuf;

use anyhow::Context;
use corral_config::Config;
use corral_telemetry::{LogConfig, LogFormat};

/// Convert config to [`LogConfig`].
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg.logging.format.parse().unwrap_or(LogFormat::Compact);

    let mut log_config = LogConfig::new(cfg.logging.level.to_ascii_lowercase()).with_format(format);

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// The libexec directory to operate on: the command-line override, if any,
/// otherwise the configured one. Always absolute.
pub(crate) fn libexec_dir(cfg: &Config, cli_override: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let dir = cli_override.unwrap_or_else(|| cfg.paths.libexec_dir.clone());
    std::path::absolute(&dir)
        .with_context(|| format!("failed to resolve libexec directory {}", dir.display()))
}
