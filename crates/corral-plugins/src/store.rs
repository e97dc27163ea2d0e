//! Metadata store: one JSON record per installed plugin.
//!
//! Records live under `<libexec>/plugin/meta/<dir>.json`. Every write goes
//! through a temp file in the same directory followed by a rename, so a
//! reader sees either the old record or the new one.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Operation, PluginError, PluginResult};
use crate::layout::{self, PluginLayout, TRASH_PREFIX};
use crate::meta::InstalledPlugin;

/// A record file that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptRecord {
    /// Path of the record file.
    pub path: PathBuf,
    /// Decode failure.
    pub message: String,
}

/// Result of reading every record.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Decoded records, sorted by name.
    pub plugins: Vec<InstalledPlugin>,
    /// Records that failed to decode.
    pub corrupt: Vec<CorruptRecord>,
}

/// One record file found while scanning the metadata directory.
pub(crate) struct ScannedRecord {
    pub(crate) dir: String,
    pub(crate) path: PathBuf,
    pub(crate) record: Result<InstalledPlugin, String>,
}

/// Durable registry of installed plugins.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    layout: PluginLayout,
}

impl MetadataStore {
    /// Open the store for a libexec directory. Nothing is created until the
    /// first write.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if `libexec` cannot be made absolute.
    pub fn open(libexec: impl AsRef<Path>) -> PluginResult<Self> {
        Ok(Self::with_layout(PluginLayout::new(libexec)?))
    }

    /// Open the store over an already resolved layout.
    #[must_use]
    pub fn with_layout(layout: PluginLayout) -> Self {
        Self { layout }
    }

    /// The layout this store reads and writes.
    #[must_use]
    pub fn layout(&self) -> &PluginLayout {
        &self.layout
    }

    /// Load the record for `name`.
    ///
    /// # Errors
    ///
    /// - [`PluginError::NotFound`] if no record exists for the name, or the
    ///   record at its path belongs to a different name
    /// - [`PluginError::CorruptRecord`] if the record cannot be decoded
    pub fn load(&self, name: &str) -> PluginResult<InstalledPlugin> {
        let not_found = || PluginError::NotFound(name.to_string());
        let dir = layout::dir_name(name).ok_or_else(not_found)?;
        match self.find_record(&dir)? {
            Some(record) if record.name() == name => Ok(record),
            _ => Err(not_found()),
        }
    }

    /// Load every record, skipping and reporting the ones that fail to decode.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if the metadata directory cannot be read.
    pub fn load_all(&self) -> PluginResult<Listing> {
        let mut listing = Listing::default();
        for scanned in self.scan_records()? {
            match scanned.record {
                Ok(record) => listing.plugins.push(record),
                Err(message) => {
                    warn!(path = %scanned.path.display(), error = %message, "Skipping corrupt plugin record");
                    listing.corrupt.push(CorruptRecord {
                        path: scanned.path,
                        message,
                    });
                },
            }
        }
        listing
            .plugins
            .sort_by(|a, b| a.name().cmp(b.name()));
        Ok(listing)
    }

    /// Enabled plugins, sorted by name. Corrupt records are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if the metadata directory cannot be read.
    pub fn enabled(&self) -> PluginResult<Vec<InstalledPlugin>> {
        Ok(self
            .load_all()?
            .plugins
            .into_iter()
            .filter(InstalledPlugin::enabled)
            .collect())
    }

    /// Persist a new enabled state for `name` and return the updated record.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load) and [`save`](Self::save).
    pub fn set_enabled(&self, name: &str, enabled: bool) -> PluginResult<InstalledPlugin> {
        let mut record = self.load(name)?;
        if record.enabled() == enabled {
            debug!(plugin = name, enabled, "Plugin already in requested state");
            return Ok(record);
        }
        record.set_enabled(enabled);
        self.save(&record)?;
        info!(plugin = name, enabled, "Updated plugin state");
        Ok(record)
    }

    /// Atomically write `record`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] if the record's name has no
    /// directory, or [`PluginError::Io`] if the write fails.
    pub fn save(&self, record: &InstalledPlugin) -> PluginResult<()> {
        let name = record.name();
        let dir = layout::dir_name(name).ok_or_else(|| {
            PluginError::manifest(format!(
                "plugin name {name:?} has no filesystem-safe characters"
            ))
        })?;
        let path = self.layout.record_file(&dir);
        let io_err = || PluginError::io(name, Operation::WriteRecord);

        let meta_dir = self.layout.meta_dir();
        std::fs::create_dir_all(&meta_dir).map_err(io_err())?;

        let mut body = serde_json::to_vec_pretty(record)
            .map_err(|e| io_err()(std::io::Error::other(e)))?;
        body.push(b'\n');

        let mut tmp = tempfile::NamedTempFile::new_in(&meta_dir).map_err(io_err())?;
        tmp.write_all(&body).map_err(io_err())?;
        // Flush before the rename so a crash cannot leave an empty record.
        tmp.as_file().sync_all().map_err(io_err())?;
        tmp.persist(&path).map_err(|e| io_err()(e.error))?;

        debug!(plugin = name, path = %path.display(), "Saved plugin record");
        Ok(())
    }

    /// Remove the record for `name` and the directory it owns.
    ///
    /// The record goes first, so no registry reader sees a record without its
    /// directory. If the directory then cannot be moved aside the record is
    /// written back and the error returned.
    ///
    /// # Errors
    ///
    /// - [`PluginError::NotFound`] / [`PluginError::CorruptRecord`] from
    ///   [`load`](Self::load)
    /// - [`PluginError::CorruptRecord`] if the recorded path is not a plugin
    ///   directory under this root
    /// - [`PluginError::Io`] if the record or directory cannot be removed
    pub fn delete(&self, name: &str) -> PluginResult<InstalledPlugin> {
        let record = self.load(name)?;
        let record_path = self
            .layout
            .record_path(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        if !self.layout.owns(record.path()) {
            return Err(PluginError::CorruptRecord {
                path: record_path,
                message: format!(
                    "recorded path {} is not a plugin directory under {}",
                    record.path().display(),
                    self.layout.root().display()
                ),
            });
        }

        std::fs::remove_file(&record_path).map_err(PluginError::io(name, Operation::RemoveRecord))?;

        if let Err(e) = self.discard_dir(name, record.path()) {
            if let Err(restore) = self.save(&record) {
                warn!(plugin = name, error = %restore, "Failed to restore plugin record after aborted delete");
            }
            return Err(e);
        }

        info!(plugin = name, path = %record.path().display(), "Deleted plugin");
        Ok(record)
    }

    /// Move a plugin directory aside and remove it. A directory that is
    /// already gone is not an error.
    pub(crate) fn discard_dir(&self, name: &str, dir: &Path) -> PluginResult<()> {
        if !dir.exists() {
            debug!(plugin = name, path = %dir.display(), "Plugin directory already absent");
            return Ok(());
        }
        let io_err = || PluginError::io(name, Operation::RemoveDirectory);

        let holder = tempfile::Builder::new()
            .prefix(TRASH_PREFIX)
            .tempdir_in(self.layout.root())
            .map_err(io_err())?;
        let trash = holder.path().join("plugin");
        if let Err(e) = std::fs::rename(dir, &trash) {
            drop(holder);
            return Err(io_err()(e));
        }

        let holder = holder.keep();
        if let Err(e) = std::fs::remove_dir_all(&holder) {
            warn!(plugin = name, path = %holder.display(), error = %e, "Failed to remove trashed plugin directory");
        }
        Ok(())
    }

    /// Read the record stored under directory name `dir`, if any.
    pub(crate) fn find_record(&self, dir: &str) -> PluginResult<Option<InstalledPlugin>> {
        let path = self.layout.record_file(dir);
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PluginError::io(dir, Operation::ReadRecord)(e)),
        };
        InstalledPlugin::from_json_reader(std::io::BufReader::new(file))
            .map(Some)
            .map_err(|message| PluginError::CorruptRecord { path, message })
    }

    /// Every `*.json` record in the metadata directory, in directory order.
    pub(crate) fn scan_records(&self) -> PluginResult<Vec<ScannedRecord>> {
        let meta_dir = self.layout.meta_dir();
        let entries = match std::fs::read_dir(&meta_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PluginError::io(&meta_dir.display().to_string(), Operation::Scan)(e)),
        };

        let mut scanned = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(PluginError::io(&meta_dir.display().to_string(), Operation::Scan))?;
            let path = entry.path();
            let Some(dir) = record_dir_name(&path) else {
                continue;
            };
            let record = match std::fs::File::open(&path) {
                Ok(file) => InstalledPlugin::from_json_reader(std::io::BufReader::new(file)),
                Err(e) => Err(format!("failed to open record: {e}")),
            };
            scanned.push(ScannedRecord { dir, path, record });
        }
        Ok(scanned)
    }
}

/// Directory name encoded in a record file name, ignoring temp files.
fn record_dir_name(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    layout::is_plugin_dir_name(stem).then(|| stem.to_string())
}
