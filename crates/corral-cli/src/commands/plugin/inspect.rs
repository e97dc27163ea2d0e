//! `corral plugin inspect`: describe an image file or an installed plugin.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::DateTime;
use corral_plugins::{
    MetadataStore, PluginImage, SectionRole, digest_file, open_image, read_manifest, validate,
};
use corral_sif::SifImage;

use crate::theme::Theme;

/// Inspect `target`: an existing file is read as a plugin image, anything
/// else is looked up as an installed plugin name.
pub(crate) fn inspect_plugin(libexec: &Path, target: &str) -> anyhow::Result<()> {
    let path = Path::new(target);
    if path.is_file() {
        inspect_image(path)
    } else {
        inspect_installed(libexec, target)
    }
}

fn inspect_image(path: &Path) -> anyhow::Result<()> {
    let image = open_image(path)?;
    let header = image.header();

    println!("{}", Theme::header(&format!("Image {}", path.display())));
    println!("{}", Theme::field("ID", &header.id.to_string()));
    println!("{}", Theme::field("Arch", header.arch.code()));
    println!("{}", Theme::field("Created", &unix_time(header.ctime)));
    println!();
    println!("  {:<4} {:<14} {:<10} {:<20} ROLE", "ID", "TYPE", "SIZE", "NAME");
    println!("{}", Theme::separator());
    for line in section_rows(&image) {
        println!("{line}");
    }
    println!();

    if let Err(e) = validate(&image) {
        println!("{}", Theme::error(&format!("Not a plugin image: {e}")));
        return Ok(());
    }
    let manifest = read_manifest(&image)?;
    println!("{}", Theme::success("Valid plugin image"));
    println!("{}", Theme::field("Name", &manifest.name));
    if let Some(version) = &manifest.version {
        println!("{}", Theme::field("Version", version));
    }
    if let Some(author) = &manifest.author {
        println!("{}", Theme::field("Author", author));
    }
    if let Some(description) = &manifest.description {
        println!("{}", Theme::field("Description", description));
    }
    println!("\n{}", Theme::dimmed("Default config.yaml:"));
    print!("{}", manifest.default_config()?);
    Ok(())
}

fn section_rows(image: &SifImage) -> Vec<String> {
    image
        .descriptors()
        .iter()
        .map(|d| {
            let role = SectionRole::REQUIRED
                .into_iter()
                .find(|role| role.matches(d))
                .map_or_else(|| "-".to_string(), |role| role.to_string());
            format!(
                "  {:<4} {:<14} {:<10} {:<20} {role}",
                d.id,
                d.data_type.to_string(),
                d.size,
                d.name
            )
        })
        .collect()
}

fn inspect_installed(libexec: &Path, name: &str) -> anyhow::Result<()> {
    let store = MetadataStore::open(libexec)?;
    let record = store.load(name)?;

    println!("{}", Theme::header(&format!("Plugin {}", record.name())));
    println!(
        "{}",
        Theme::field("State", if record.enabled() { "enabled" } else { "disabled" })
    );
    println!("{}", Theme::field("Path", &record.path().display().to_string()));
    if let Some(version) = record.version() {
        println!("{}", Theme::field("Version", version));
    }
    if let Some(at) = record.installed_at() {
        println!("{}", Theme::field("Installed", &at.to_rfc3339()));
    }

    if let Some(expected) = record.object_digest() {
        println!("{}", Theme::field("Object", expected));
        match digest_file(&record.object_path()) {
            Ok(actual) if actual == expected => {},
            Ok(actual) => println!(
                "{}",
                Theme::warning(&format!("Object on disk has digest {actual}"))
            ),
            Err(e) => println!("{}", Theme::warning(&format!("Object unreadable: {e}"))),
        }
    }

    if let Ok(image) = open_image(&record.image_path())
        && image.has_section(SectionRole::Manifest)
        && let Ok(manifest) = read_manifest(&image)
        && let Some(description) = &manifest.description
    {
        println!("{}", Theme::field("Description", description));
    }

    match record.open_config()? {
        Some(mut file) => {
            let mut config = String::new();
            file.read_to_string(&mut config)
                .with_context(|| format!("failed to read {}", record.config_path().display()))?;
            println!("\n{}", Theme::dimmed("config.yaml:"));
            print!("{config}");
        },
        None => println!("{}", Theme::dimmed("No config.yaml")),
    }
    Ok(())
}

fn unix_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0).map_or_else(|| secs.to_string(), |t| t.to_rfc3339())
}
