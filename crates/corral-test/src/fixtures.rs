//! Plugin image fixtures.

use std::path::{Path, PathBuf};

use corral_sif::{Arch, FsType, ObjectInput, PartType, SifBuilder, SifImage};

/// Fixed timestamp so fixture images are byte-stable within a test.
pub const FIXTURE_TIME: i64 = 1_700_000_000;

/// Compiled-object bytes used by default fixtures.
#[must_use]
pub fn sample_object(name: &str) -> Vec<u8> {
    format!("\x7fELF compiled object for {name}").into_bytes()
}

/// Manifest JSON declaring only a name.
#[must_use]
pub fn sample_manifest_json(name: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "name": name })).unwrap()
}

/// A raw data partition holding `bytes`, as a plugin object section.
#[must_use]
pub fn object_partition(bytes: &[u8]) -> ObjectInput {
    ObjectInput::partition(
        "object.so",
        bytes.to_vec(),
        FsType::Raw,
        PartType::Data,
        Arch::Amd64,
    )
}

/// Image bytes with the given manifest JSON and object bytes.
#[must_use]
pub fn plugin_image_with(manifest_json: &[u8], object: &[u8]) -> Vec<u8> {
    SifBuilder::new()
        .arch(Arch::Amd64)
        .timestamp(FIXTURE_TIME)
        .add_object(object_partition(object))
        .add_object(ObjectInput::generic_json(
            "manifest.json",
            manifest_json.to_vec(),
        ))
        .build()
        .unwrap()
}

/// Image bytes for a minimal valid plugin named `name`.
#[must_use]
pub fn plugin_image_bytes(name: &str) -> Vec<u8> {
    plugin_image_with(&sample_manifest_json(name), &sample_object(name))
}

/// Parsed minimal valid plugin image named `name`.
#[must_use]
pub fn plugin_image(name: &str) -> SifImage {
    SifImage::from_bytes(plugin_image_bytes(name)).unwrap()
}

/// Write a minimal valid plugin image for `name` into `dir`.
#[must_use]
pub fn write_plugin_image(dir: &Path, name: &str) -> PathBuf {
    let file_name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let path = dir.join(format!("{file_name}.sif"));
    std::fs::write(&path, plugin_image_bytes(name)).unwrap();
    path
}
