//! `corral plugin create`: package a compiled object and manifest as a SIF image.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, bail};
use corral_plugins::{Manifest, validate_bytes};
use corral_sif::{Arch, FsType, ObjectInput, PartType, SifBuilder};

use crate::theme::Theme;

pub(crate) fn create_plugin(
    object: &Path,
    manifest: &Path,
    output: &Path,
    force: bool,
) -> anyhow::Result<()> {
    let manifest_json = std::fs::read(manifest)
        .with_context(|| format!("failed to read manifest {}", manifest.display()))?;
    let parsed = Manifest::from_json(&manifest_json)?;
    let object_bytes = std::fs::read(object)
        .with_context(|| format!("failed to read object {}", object.display()))?;

    let bytes = package(manifest_json, object_bytes)?;
    let image = validate_bytes(bytes).context("assembled image is not a valid plugin")?;
    write_output(output, image.as_bytes(), force)?;

    println!(
        "{}",
        Theme::success(&format!(
            "Created plugin '{}' at {}",
            parsed.name,
            output.display()
        ))
    );
    Ok(())
}

/// Write the image, refusing to replace an existing file unless `force`.
fn write_output(output: &Path, bytes: &[u8], force: bool) -> anyhow::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = match options.open(output) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            bail!(
                "{} already exists (use --force to overwrite)",
                output.display()
            );
        },
        Err(e) => {
            return Err(e).with_context(|| format!("failed to create {}", output.display()));
        },
    };
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to write {}", output.display()))
}

/// Assemble the plugin image: the object as a raw data partition for the
/// host architecture, then the manifest as generic JSON.
fn package(manifest_json: Vec<u8>, object: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let arch = Arch::host();
    let bytes = SifBuilder::new()
        .arch(arch)
        .add_object(ObjectInput::partition(
            "object.so",
            object,
            FsType::Raw,
            PartType::Data,
            arch,
        ))
        .add_object(ObjectInput::generic_json("manifest.json", manifest_json))
        .build()?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use corral_plugins::{Installer, PluginImage, SectionRole, read_manifest};
    use corral_test::ScratchLibexec;

    use super::*;

    fn inputs(dir: &Path, manifest: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let object = dir.join("plugin.so");
        let manifest_path = dir.join("manifest.json");
        std::fs::write(&object, b"\x7fELF built object").unwrap();
        std::fs::write(&manifest_path, manifest).unwrap();
        (object, manifest_path)
    }

    #[test]
    fn test_created_image_installs() {
        let dir = tempfile::tempdir().unwrap();
        let (object, manifest) = inputs(dir.path(), r#"{"name":"example.org/log","version":"1.0"}"#);
        let output = dir.path().join("log.sif");

        create_plugin(&object, &manifest, &output, false).unwrap();

        let image = corral_plugins::open_image(&output).unwrap();
        assert_eq!(
            image.section_bytes(SectionRole::Object),
            Some(&b"\x7fELF built object"[..])
        );
        assert_eq!(read_manifest(&image).unwrap().name, "example.org/log");

        let libexec = ScratchLibexec::new();
        let record = Installer::new(libexec.path())
            .unwrap()
            .install_file(&output)
            .unwrap();
        assert_eq!(record.version(), Some("1.0"));
    }

    #[test]
    fn test_invalid_manifest_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (object, manifest) = inputs(dir.path(), r#"{"name":"  "}"#);
        let output = dir.path().join("bad.sif");

        assert!(create_plugin(&object, &manifest, &output, false).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_existing_output_needs_force() {
        let dir = tempfile::tempdir().unwrap();
        let (object, manifest) = inputs(dir.path(), r#"{"name":"hello"}"#);
        let output = dir.path().join("hello.sif");
        std::fs::write(&output, b"old").unwrap();

        let err = create_plugin(&object, &manifest, &output, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(std::fs::read(&output).unwrap(), b"old");
        create_plugin(&object, &manifest, &output, true).unwrap();
        assert!(corral_plugins::validate_bytes(std::fs::read(&output).unwrap()).is_ok());
    }

    #[test]
    fn test_empty_object_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (object, manifest) = inputs(dir.path(), r#"{"name":"hello"}"#);
        std::fs::write(&object, b"").unwrap();
        let output = dir.path().join("hello.sif");

        assert!(create_plugin(&object, &manifest, &output, false).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_write_output_never_replaces_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.sif");

        write_output(&output, b"first", false).unwrap();
        let err = write_output(&output, b"second", false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read(&output).unwrap(), b"first");

        write_output(&output, b"second", true).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"second");
    }
}
