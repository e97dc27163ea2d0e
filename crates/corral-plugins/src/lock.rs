//! Per-plugin advisory lock.
//!
//! The registry itself never locks. Callers that may race on the same plugin
//! name (two `install` runs, `install` against `uninstall`) hold a
//! [`PluginLock`] around the operation.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Operation, PluginError, PluginResult};
use crate::layout::PluginLayout;

/// Exclusive lock on `<libexec>/plugin/.locks/<dir>.lk`, released on drop.
#[derive(Debug)]
pub struct PluginLock {
    _file: File,
    path: PathBuf,
}

impl PluginLock {
    /// Block until the lock for `name` is held.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] if the name has no directory, or
    /// [`PluginError::Io`] if the lock file cannot be created or locked.
    pub fn acquire(layout: &PluginLayout, name: &str) -> PluginResult<Self> {
        let (file, path) = open_lock_file(layout, name)?;
        file.lock_exclusive()
            .map_err(PluginError::io(name, Operation::Lock))?;
        debug!(plugin = name, path = %path.display(), "Acquired plugin lock");
        Ok(Self { _file: file, path })
    }

    /// Take the lock for `name` if nobody else holds it.
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire), except contention returns
    /// `Ok(None)`.
    pub fn try_acquire(layout: &PluginLayout, name: &str) -> PluginResult<Option<Self>> {
        let (file, path) = open_lock_file(layout, name)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(PluginError::io(name, Operation::Lock)(e)),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(layout: &PluginLayout, name: &str) -> PluginResult<(File, PathBuf)> {
    let path = layout
        .lock_path(name)
        .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
    let io_err = || PluginError::io(name, Operation::Lock);
    std::fs::create_dir_all(layout.locks_dir()).map_err(io_err())?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .read(true)
        .open(&path)
        .map_err(io_err())?;
    Ok((file, path))
}
