//! `corral config` commands.

use anyhow::anyhow;
use corral_config::ResolvedConfig;

use crate::theme::Theme;

pub(crate) fn show_config(resolved: &ResolvedConfig) -> anyhow::Result<()> {
    let rendered = resolved.config.to_toml().map_err(|e| anyhow!(e))?;

    if resolved.loaded_files.is_empty() {
        println!("{}", Theme::dimmed("# No config files found, using defaults"));
    }
    for file in &resolved.loaded_files {
        println!("{}", Theme::dimmed(&format!("# Loaded: {file}")));
    }
    for var in &resolved.env_overrides {
        println!("{}", Theme::dimmed(&format!("# Overridden by ${var}")));
    }
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use corral_config::{Sources, loader::load_layers};

    use super::*;

    #[test]
    fn test_show_defaults() {
        let resolved = load_layers(&Sources::default()).unwrap();
        show_config(&resolved).unwrap();
    }
}
