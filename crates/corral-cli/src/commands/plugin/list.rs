//! `corral plugin list`.

use std::path::Path;

use corral_plugins::{CorruptRecord, InstalledPlugin, MetadataStore};

use crate::theme::Theme;

pub(crate) fn list_plugins(libexec: &Path, json: bool) -> anyhow::Result<()> {
    let store = MetadataStore::open(libexec)?;
    let listing = store.load_all()?;

    for line in corrupt_lines(&listing.corrupt) {
        eprintln!("{}", Theme::warning(&line));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listing.plugins)?);
        return Ok(());
    }

    if listing.plugins.is_empty() {
        println!("{}", Theme::info("No plugins installed"));
        return Ok(());
    }

    println!("{}", Theme::header("Installed Plugins"));
    println!("  {:<32} {:<10} {:<10} PATH", "NAME", "VERSION", "STATE");
    println!("{}", Theme::separator());
    for plugin in &listing.plugins {
        println!("{}", row(plugin));
    }
    println!(
        "\n{}",
        Theme::dimmed(&format!("{} plugin(s)", listing.plugins.len()))
    );
    Ok(())
}

fn corrupt_lines(corrupt: &[CorruptRecord]) -> Vec<String> {
    corrupt
        .iter()
        .map(|c| format!("Skipping corrupt record {}: {}", c.path.display(), c.message))
        .collect()
}

fn row(plugin: &InstalledPlugin) -> String {
    let state = if plugin.enabled() {
        "enabled"
    } else {
        "disabled"
    };
    format!(
        "  {:<32} {:<10} {:<10} {}",
        plugin.name(),
        plugin.version().unwrap_or("-"),
        state,
        plugin.path().display()
    )
}
