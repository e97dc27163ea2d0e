//! Plugin installation.
//!
//! All checks that can reject an image (validation, manifest, name
//! collision) run before anything is written. Artifacts are then assembled in
//! a hidden staging directory inside the plugin root and swapped into place,
//! and the metadata record is written last. A failure at any point after
//! staging leaves the previous install, or nothing, in place.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{InvalidImage, Operation, PluginError, PluginResult};
use crate::image::{self, PluginImage, SectionRole};
use crate::layout::{self, BACKUP_PREFIX, NAME_CONFIG, NAME_IMAGE, NAME_OBJECT, STAGING_PREFIX};
use crate::manifest::read_manifest;
use crate::meta::{InstalledPlugin, digest_bytes};
use crate::store::MetadataStore;

/// Installs plugin images into one libexec directory.
#[derive(Debug, Clone)]
pub struct Installer {
    store: MetadataStore,
}

impl Installer {
    /// Installer for `<libexec>/plugin`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if `libexec` cannot be made absolute.
    pub fn new(libexec: impl AsRef<Path>) -> PluginResult<Self> {
        Ok(Self::with_store(MetadataStore::open(libexec)?))
    }

    /// Installer writing through an existing store.
    #[must_use]
    pub fn with_store(store: MetadataStore) -> Self {
        Self { store }
    }

    /// The store records are written to.
    #[must_use]
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Read, validate and install the image file at `path`.
    ///
    /// # Errors
    ///
    /// See [`install`](Self::install); additionally [`PluginError::Io`] if
    /// the file cannot be read.
    pub fn install_file(&self, path: &Path) -> PluginResult<InstalledPlugin> {
        debug!(path = %path.display(), "Installing plugin from file");
        let image = image::open_image(path)?;
        self.install(&image)
    }

    /// Install a plugin image, replacing a previous install of the same
    /// plugin. A re-install keeps the existing `config.yaml` and enabled
    /// state.
    ///
    /// # Errors
    ///
    /// - [`PluginError::InvalidImage`] if the image is not a plugin package
    /// - [`PluginError::Manifest`] if the manifest is unusable
    /// - [`PluginError::NameCollision`] if another plugin owns the path
    /// - [`PluginError::CorruptRecord`] if the record at the path is undecodable
    /// - [`PluginError::Io`] naming the failed step otherwise
    pub fn install<I: PluginImage + ?Sized>(&self, image: &I) -> PluginResult<InstalledPlugin> {
        image::validate(image)?;
        let manifest = read_manifest(image)?;
        let name = manifest.name.as_str();
        let default_config = manifest.default_config()?;
        let object = image
            .section_bytes(SectionRole::Object)
            .ok_or(InvalidImage::MissingSection(SectionRole::Object))?;

        let plugin_layout = self.store.layout();
        let dir = layout::dir_name(name).ok_or_else(|| {
            PluginError::manifest(format!(
                "plugin name {name:?} has no filesystem-safe characters"
            ))
        })?;
        let target = plugin_layout.dir_path(&dir);

        let previous = self.store.find_record(&dir)?;
        if let Some(existing) = &previous
            && existing.name() != name
        {
            return Err(PluginError::NameCollision {
                name: name.to_string(),
                existing: existing.name().to_string(),
                path: target,
            });
        }
        if previous.is_none() && target.exists() {
            warn!(plugin = name, path = %target.display(), "Replacing plugin directory that has no record");
        }

        let backup = plugin_layout.root().join(format!("{BACKUP_PREFIX}{dir}"));
        if previous.is_some() {
            recover_interrupted_swap(&target, &backup, name)?;
        }

        let staging = create_staging(plugin_layout.root(), &dir, name)?;
        debug!(plugin = name, staging = %staging.path().display(), "Staging plugin artifacts");

        std::fs::write(staging.path().join(NAME_IMAGE), image.image_bytes())
            .map_err(PluginError::io(name, Operation::WriteImage))?;
        std::fs::write(staging.path().join(NAME_OBJECT), object)
            .map_err(PluginError::io(name, Operation::ExtractObject))?;
        stage_config(
            staging.path(),
            previous.as_ref().map(|_| target.join(NAME_CONFIG)),
            &default_config,
            name,
        )?;

        let mut record = InstalledPlugin::new(name, target.clone())
            .with_version(manifest.version.clone())
            .with_installed_at(Utc::now())
            .with_object_digest(digest_bytes(object));
        if let Some(existing) = &previous {
            record.set_enabled(existing.enabled());
        }

        swap_into_place(staging, &target, &backup, name, || self.store.save(&record))?;

        info!(
            plugin = name,
            path = %target.display(),
            reinstall = previous.is_some(),
            "Installed plugin"
        );
        Ok(record)
    }
}

/// Install `image` under `libexec`.
///
/// # Errors
///
/// See [`Installer::install`].
pub fn install<I: PluginImage + ?Sized>(
    image: &I,
    libexec: impl AsRef<Path>,
) -> PluginResult<InstalledPlugin> {
    Installer::new(libexec)?.install(image)
}

fn create_staging(root: &Path, dir: &str, name: &str) -> PluginResult<TempDir> {
    let io_err = || PluginError::io(name, Operation::CreateStaging);
    std::fs::create_dir_all(root).map_err(io_err())?;
    let staging = tempfile::Builder::new()
        .prefix(&format!("{STAGING_PREFIX}{dir}-"))
        .tempdir_in(root)
        .map_err(io_err())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(0o755))
            .map_err(io_err())?;
    }

    Ok(staging)
}

/// Move the backup of an interrupted re-install back into place, so the
/// previous install's config is carried over from it.
fn recover_interrupted_swap(target: &Path, backup: &Path, name: &str) -> PluginResult<()> {
    if target.exists() || !backup.is_dir() {
        return Ok(());
    }
    std::fs::rename(backup, target).map_err(PluginError::io(name, Operation::SwapDirectory))?;
    info!(
        plugin = name,
        path = %target.display(),
        "Restored plugin directory left by an interrupted install"
    );
    Ok(())
}

/// Copy the previous install's config into staging, or write the default
/// when there is none.
fn stage_config(
    staging: &Path,
    previous: Option<PathBuf>,
    default_config: &str,
    name: &str,
) -> PluginResult<()> {
    let dest = staging.join(NAME_CONFIG);
    if let Some(previous) = previous {
        match std::fs::copy(&previous, &dest) {
            Ok(_) => {
                debug!(plugin = name, "Carried over existing plugin config");
                return Ok(());
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(PluginError::io(name, Operation::WriteConfig)(e)),
        }
    }
    std::fs::write(&dest, default_config).map_err(PluginError::io(name, Operation::WriteConfig))
}

/// Swap a staging directory into `target`, then run `commit`.
///
/// Order: back up the existing target, rename staging into place, commit.
/// If the rename or the commit fails the previous target is restored.
fn swap_into_place(
    staging: TempDir,
    target: &Path,
    backup: &Path,
    name: &str,
    commit: impl FnOnce() -> PluginResult<()>,
) -> PluginResult<()> {
    let swap_err = || PluginError::io(name, Operation::SwapDirectory);

    let backed_up = if target.exists() {
        if backup.exists() {
            debug!(plugin = name, path = %backup.display(), "Removing stale backup directory");
            std::fs::remove_dir_all(backup).map_err(swap_err())?;
        }
        std::fs::rename(target, backup).map_err(swap_err())?;
        true
    } else {
        false
    };

    let staging_path = staging.keep();
    if let Err(e) = std::fs::rename(&staging_path, target) {
        if backed_up {
            restore(backup, target, name);
        }
        discard(&staging_path, name);
        return Err(swap_err()(e));
    }

    if let Err(e) = commit() {
        restore(target, &staging_path, name);
        if backed_up {
            restore(backup, target, name);
        }
        discard(&staging_path, name);
        return Err(e);
    }

    if backed_up {
        discard(backup, name);
    }
    Ok(())
}

fn restore(from: &Path, to: &Path, name: &str) {
    if let Err(e) = std::fs::rename(from, to) {
        warn!(
            plugin = name,
            from = %from.display(),
            to = %to.display(),
            error = %e,
            "Rollback rename failed"
        );
    }
}

fn discard(path: &Path, name: &str) {
    if let Err(e) = std::fs::remove_dir_all(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(plugin = name, path = %path.display(), error = %e, "Failed to remove directory");
    }
}

#[cfg(test)]
mod tests {
    use corral_test::{ScratchLibexec, plugin_image, plugin_image_with, sample_object};

    use super::*;
    use corral_sif::SifImage;

    #[test]
    fn fresh_install_writes_three_artifacts() {
        let libexec = ScratchLibexec::new();
        let record = install(&plugin_image("hello"), libexec.path()).unwrap();

        assert_eq!(record.name(), "hello");
        assert!(record.enabled());
        assert_eq!(record.version(), None);
        assert!(record.installed_at().is_some());

        let mut files: Vec<_> = std::fs::read_dir(record.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        files.sort();
        assert_eq!(files, ["config.yaml", "object.so", "plugin.sif"]);
        assert_eq!(
            std::fs::read(record.object_path()).unwrap(),
            sample_object("hello")
        );
        assert_eq!(
            record.object_digest(),
            Some(digest_bytes(&sample_object("hello")).as_str())
        );
    }

    #[test]
    fn stored_image_is_byte_identical() {
        let libexec = ScratchLibexec::new();
        let image = plugin_image("hello");
        let record = install(&image, libexec.path()).unwrap();
        assert_eq!(
            std::fs::read(record.image_path()).unwrap(),
            image.image_bytes()
        );
    }

    #[test]
    fn default_config_comes_from_manifest() {
        let libexec = ScratchLibexec::new();
        let image = SifImage::from_bytes(plugin_image_with(
            br#"{"name":"cfg","version":"2.0","config":{"verbose":true}}"#,
            b"obj",
        ))
        .unwrap();
        let record = install(&image, libexec.path()).unwrap();
        let config = std::fs::read_to_string(record.config_path()).unwrap();
        assert!(config.contains("verbose: true"));
        assert_eq!(record.version(), Some("2.0"));
    }

    #[test]
    fn invalid_image_writes_nothing() {
        let libexec = ScratchLibexec::new();
        let image = SifImage::from_bytes(
            corral_sif::SifBuilder::new()
                .add_object(corral_test::object_partition(b"obj"))
                .build()
                .unwrap(),
        )
        .unwrap();
        assert!(matches!(
            install(&image, libexec.path()),
            Err(PluginError::InvalidImage(InvalidImage::MissingSection(
                SectionRole::Manifest
            )))
        ));
        assert!(!libexec.path().join("plugin").exists());
    }

    #[test]
    fn bad_manifest_writes_nothing() {
        let libexec = ScratchLibexec::new();
        let image = SifImage::from_bytes(plugin_image_with(br#"{"version":"1"}"#, b"obj")).unwrap();
        assert!(matches!(
            install(&image, libexec.path()),
            Err(PluginError::Manifest { .. })
        ));
        assert!(!libexec.path().join("plugin").exists());
    }

    #[test]
    fn orphan_directory_is_replaced() {
        let libexec = ScratchLibexec::new();
        let installer = Installer::new(libexec.path()).unwrap();
        let target = installer.store().layout().plugin_dir("hello").unwrap();
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("junk"), b"left behind").unwrap();

        let record = installer.install(&plugin_image("hello")).unwrap();
        assert_eq!(record.path(), target);
        assert!(!target.join("junk").exists());
        assert!(record.image_path().exists());
    }

    #[test]
    fn corrupt_record_at_target_aborts() {
        let libexec = ScratchLibexec::new();
        let installer = Installer::new(libexec.path()).unwrap();
        let record_path = installer.store().layout().record_path("hello").unwrap();
        std::fs::create_dir_all(record_path.parent().unwrap()).unwrap();
        std::fs::write(&record_path, b"not json").unwrap();

        assert!(matches!(
            installer.install(&plugin_image("hello")),
            Err(PluginError::CorruptRecord { .. })
        ));
        assert_eq!(libexec.plugin_root_entries(), ["meta"]);
    }

    #[test]
    fn failed_commit_restores_previous_install() {
        let libexec = ScratchLibexec::new();
        let root = libexec.path().join("plugin");
        std::fs::create_dir_all(&root).unwrap();
        let target = root.join("hello");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("marker"), b"old").unwrap();

        let staging = tempfile::Builder::new()
            .prefix(".staging-hello-")
            .tempdir_in(&root)
            .unwrap();
        std::fs::write(staging.path().join("marker"), b"new").unwrap();

        let err = swap_into_place(staging, &target, &root.join(".backup-hello"), "hello", || {
            Err(PluginError::NotFound("simulated".into()))
        })
        .unwrap_err();
        assert!(matches!(err, PluginError::NotFound(_)));
        assert_eq!(std::fs::read(target.join("marker")).unwrap(), b"old");
        assert_eq!(libexec.plugin_root_entries(), ["hello"]);
    }

    #[test]
    fn failed_commit_on_fresh_install_leaves_nothing() {
        let libexec = ScratchLibexec::new();
        let root = libexec.path().join("plugin");
        std::fs::create_dir_all(&root).unwrap();
        let staging = tempfile::Builder::new()
            .prefix(".staging-hello-")
            .tempdir_in(&root)
            .unwrap();

        let target = root.join("hello");
        swap_into_place(staging, &target, &root.join(".backup-hello"), "hello", || {
            Err(PluginError::NotFound("simulated".into()))
        })
        .unwrap_err();
        assert!(libexec.plugin_root_entries().is_empty());
    }

    #[test]
    fn stale_backup_is_replaced() {
        let libexec = ScratchLibexec::new();
        let root = libexec.path().join("plugin");
        let target = root.join("hello");
        let backup = root.join(".backup-hello");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::create_dir_all(&backup).unwrap();
        let staging = tempfile::Builder::new().tempdir_in(&root).unwrap();
        std::fs::write(staging.path().join("marker"), b"new").unwrap();

        swap_into_place(staging, &target, &backup, "hello", || Ok(())).unwrap();
        assert_eq!(std::fs::read(target.join("marker")).unwrap(), b"new");
        assert_eq!(libexec.plugin_root_entries(), ["hello"]);
    }

    #[test]
    fn backup_is_restored_only_when_target_is_missing() {
        let libexec = ScratchLibexec::new();
        let root = libexec.path().join("plugin");
        let target = root.join("hello");
        let backup = root.join(".backup-hello");
        std::fs::create_dir_all(&backup).unwrap();
        std::fs::write(backup.join("config.yaml"), b"kept").unwrap();

        recover_interrupted_swap(&target, &backup, "hello").unwrap();
        assert_eq!(std::fs::read(target.join("config.yaml")).unwrap(), b"kept");
        assert!(!backup.exists());

        std::fs::create_dir_all(&backup).unwrap();
        recover_interrupted_swap(&target, &backup, "hello").unwrap();
        assert!(backup.exists());
        assert_eq!(std::fs::read(target.join("config.yaml")).unwrap(), b"kept");
    }

    #[cfg(unix)]
    #[test]
    fn plugin_directory_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let libexec = ScratchLibexec::new();
        let record = install(&plugin_image("hello"), libexec.path()).unwrap();
        let mode = std::fs::metadata(record.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
