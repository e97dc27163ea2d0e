//! `corral plugin enable` / `corral plugin disable`.

use std::path::Path;

use corral_plugins::{MetadataStore, PluginLock};

use crate::theme::Theme;

pub(crate) fn set_plugin_enabled(libexec: &Path, name: &str, enabled: bool) -> anyhow::Result<()> {
    let store = MetadataStore::open(libexec)?;
    let _lock = PluginLock::acquire(store.layout(), name)?;
    let record = store.set_enabled(name, enabled)?;

    let verb = if record.enabled() {
        "enabled"
    } else {
        "disabled"
    };
    println!(
        "{}",
        Theme::success(&format!("Plugin '{}' {verb}", record.name()))
    );
    Ok(())
}
