//! `corral plugin uninstall`.

use std::path::Path;

use corral_plugins::{MetadataStore, PluginError, PluginLock};

use crate::theme::Theme;

pub(crate) fn uninstall_plugin(libexec: &Path, name: &str) -> anyhow::Result<()> {
    let store = MetadataStore::open(libexec)?;
    let _lock = PluginLock::acquire(store.layout(), name)?;

    println!("{}", Theme::info(&format!("Removing plugin: {name}")));
    let record = match store.delete(name) {
        Ok(record) => record,
        Err(e @ PluginError::NotFound(_)) => {
            return Err(anyhow::Error::new(e).context(format!(
                "plugin '{name}' is not installed; if an earlier uninstall was interrupted, \
                 run `corral plugin verify --repair` to remove its leftover directory"
            )));
        },
        Err(e) => return Err(e.into()),
    };

    println!(
        "{}",
        Theme::success(&format!("Plugin '{}' removed", record.name()))
    );
    println!(
        "{}",
        Theme::dimmed(&format!("  Deleted: {}", record.path().display()))
    );
    Ok(())
}
