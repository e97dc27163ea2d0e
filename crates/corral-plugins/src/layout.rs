//! On-disk layout of installed plugins.
//!
//! ```text
//! <libexec>/plugin/
//!     <slug>-<hash>/        plugin.sif, object.so, config.yaml
//!     meta/<slug>-<hash>.json
//!     .locks/<slug>-<hash>.lk
//! ```
//!
//! The directory name is a pure function of the plugin name: a readable slug
//! followed by the first 16 hex digits of the BLAKE3 hash of the untruncated
//! slug. Names that normalize to the same slug share a directory, which the
//! installer detects through the record's name.

use std::path::{Path, PathBuf};

use crate::error::{Operation, PluginError, PluginResult};

/// Directory under libexec holding every plugin.
pub const DIR_ROOT: &str = "plugin";
/// Directory under the plugin root holding metadata records.
pub const META_DIR: &str = "meta";
/// Directory under the plugin root holding lock files.
pub const LOCKS_DIR: &str = ".locks";
/// Stored copy of the plugin image.
pub const NAME_IMAGE: &str = "plugin.sif";
/// Extracted compiled object.
pub const NAME_OBJECT: &str = "object.so";
/// Plugin configuration file.
pub const NAME_CONFIG: &str = "config.yaml";

pub(crate) const STAGING_PREFIX: &str = ".staging-";
pub(crate) const TRASH_PREFIX: &str = ".trash-";
pub(crate) const BACKUP_PREFIX: &str = ".backup-";

const SLUG_MAX_LEN: usize = 48;
const HASH_HEX_LEN: usize = 16;

/// Normalize a plugin name into a filesystem-safe slug.
///
/// The result may be empty when the name has no usable characters.
#[must_use]
pub fn slug(name: &str) -> String {
    let mut out = full_slug(name);
    out.truncate(SLUG_MAX_LEN);
    out
}

fn full_slug(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_start_matches(['.', '-']).to_string()
}

/// Directory name owned by the plugin `name`, or `None` if the name has an
/// empty slug.
#[must_use]
pub fn dir_name(name: &str) -> Option<String> {
    let full = full_slug(name);
    if full.is_empty() {
        return None;
    }
    let hash = blake3::hash(full.as_bytes()).to_hex();
    let short = &hash.as_str()[..HASH_HEX_LEN];
    let mut slug = full;
    slug.truncate(SLUG_MAX_LEN);
    Some(format!("{slug}-{short}"))
}

/// Install path for `name` under `libexec`, without making it absolute.
#[must_use]
pub fn install_path(libexec: &Path, name: &str) -> Option<PathBuf> {
    dir_name(name).map(|dir| libexec.join(DIR_ROOT).join(dir))
}

/// Resolved plugin root for one libexec directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginLayout {
    root: PathBuf,
}

impl PluginLayout {
    /// Layout rooted at `<libexec>/plugin`, with `libexec` made absolute.
    ///
    /// Does not touch the filesystem beyond reading the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if a relative path cannot be resolved.
    pub fn new(libexec: impl AsRef<Path>) -> PluginResult<Self> {
        let libexec = libexec.as_ref();
        let absolute = std::path::absolute(libexec)
            .map_err(PluginError::io(&libexec.display().to_string(), Operation::ResolvePath))?;
        Ok(Self {
            root: absolute.join(DIR_ROOT),
        })
    }

    /// `<libexec>/plugin`.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<libexec>/plugin/meta`.
    #[must_use]
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    /// `<libexec>/plugin/.locks`.
    #[must_use]
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    /// Directory owned by `name`.
    #[must_use]
    pub fn plugin_dir(&self, name: &str) -> Option<PathBuf> {
        dir_name(name).map(|dir| self.dir_path(&dir))
    }

    /// Metadata record path for `name`.
    #[must_use]
    pub fn record_path(&self, name: &str) -> Option<PathBuf> {
        dir_name(name).map(|dir| self.record_file(&dir))
    }

    /// Lock file path for `name`.
    #[must_use]
    pub fn lock_path(&self, name: &str) -> Option<PathBuf> {
        dir_name(name).map(|dir| self.locks_dir().join(format!("{dir}.lk")))
    }

    /// Whether `path` is a plugin directory directly under this root.
    ///
    /// Hidden entries and the metadata directory are never owned by a plugin.
    #[must_use]
    pub fn owns(&self, path: &Path) -> bool {
        if path.parent() != Some(self.root.as_path()) {
            return false;
        }
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_plugin_dir_name)
    }

    pub(crate) fn dir_path(&self, dir: &str) -> PathBuf {
        self.root.join(dir)
    }

    pub(crate) fn record_file(&self, dir: &str) -> PathBuf {
        self.meta_dir().join(format!("{dir}.json"))
    }
}

/// Whether a plugin-root entry name can belong to a plugin.
pub(crate) fn is_plugin_dir_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && name != META_DIR
}
