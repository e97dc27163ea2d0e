//! `corral plugin install`.

use std::path::Path;

use anyhow::Context;
use corral_plugins::{Installer, PluginLock, open_image, read_manifest, validate};

use crate::theme::Theme;

pub(crate) fn install_plugin(libexec: &Path, image_path: &Path) -> anyhow::Result<()> {
    let image = open_image(image_path)?;
    validate(&image)
        .with_context(|| format!("{} is not a plugin image", image_path.display()))?;
    let manifest = read_manifest(&image)?;

    let installer = Installer::new(libexec)?;
    println!(
        "{}",
        Theme::info(&format!("Installing plugin: {}", manifest.name))
    );

    // Held across the whole install so enable/uninstall of the same plugin
    // waits for the record to settle.
    let _lock = PluginLock::acquire(installer.store().layout(), &manifest.name)?;
    let record = installer.install(&image)?;

    println!(
        "{}",
        Theme::success(&format!("Installed plugin '{}'", record.name()))
    );
    println!(
        "{}",
        Theme::dimmed(&format!("  Location: {}", record.path().display()))
    );
    if !record.enabled() {
        println!(
            "{}",
            Theme::warning("Plugin was disabled before this install and remains disabled")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use corral_plugins::MetadataStore;
    use corral_test::{ScratchLibexec, write_plugin_image};

    use super::*;

    #[test]
    fn test_install_from_file() {
        let libexec = ScratchLibexec::new();
        let source = tempfile::tempdir().unwrap();
        let image = write_plugin_image(source.path(), "hello");

        install_plugin(libexec.path(), &image).unwrap();

        let record = MetadataStore::open(libexec.path())
            .unwrap()
            .load("hello")
            .unwrap();
        assert!(record.image_path().is_file());
    }

    #[test]
    fn test_install_rejects_non_plugin_image() {
        let libexec = ScratchLibexec::new();
        let source = tempfile::tempdir().unwrap();
        let path = source.path().join("empty.sif");
        corral_sif::SifBuilder::new().write_to(&path).unwrap();

        let err = install_plugin(libexec.path(), &path).unwrap_err();
        assert!(err.to_string().contains("is not a plugin image"));
        assert!(libexec.plugin_root_entries().is_empty());
    }
}
