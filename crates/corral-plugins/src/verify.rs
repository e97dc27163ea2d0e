//! Registry consistency checks.
//!
//! An interrupted install or delete can leave the plugin root in a state the
//! registry API never exposes on its own: a record without its directory, a
//! directory without its record, or hidden staging, trash and backup
//! directories. [`verify`] finds these; [`repair`] removes what can be
//! removed safely.
//!
//! Neither function takes plugin locks. Run them only while no install or
//! delete is in flight, since in-progress staging directories look exactly
//! like leftovers.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Operation, PluginError, PluginResult};
use crate::layout::{self, BACKUP_PREFIX, STAGING_PREFIX, TRASH_PREFIX};
use crate::meta::digest_file;
use crate::store::MetadataStore;

/// Kind of hidden directory left behind by interrupted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeftoverKind {
    /// Artifacts staged by an install that never completed.
    Staging,
    /// A directory moved aside by a delete that never completed.
    Trash,
    /// The previous install saved aside during a re-install.
    Backup,
}

impl LeftoverKind {
    fn classify(file_name: &str) -> Option<Self> {
        if file_name.starts_with(STAGING_PREFIX) {
            Some(Self::Staging)
        } else if file_name.starts_with(TRASH_PREFIX) {
            Some(Self::Trash)
        } else if file_name.starts_with(BACKUP_PREFIX) {
            Some(Self::Backup)
        } else {
            None
        }
    }
}

impl fmt::Display for LeftoverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Staging => "staging",
            Self::Trash => "trash",
            Self::Backup => "backup",
        })
    }
}

/// One finding of [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// A record whose directory or stored image is missing.
    DanglingRecord {
        /// Recorded plugin name.
        name: String,
        /// Recorded plugin directory.
        path: PathBuf,
        /// The record file.
        record: PathBuf,
    },
    /// A plugin directory no record points at.
    OrphanDirectory {
        /// The directory.
        path: PathBuf,
    },
    /// A hidden directory left by interrupted work.
    Leftover {
        /// What kind of leftover.
        kind: LeftoverKind,
        /// The directory.
        path: PathBuf,
    },
    /// A record file that cannot be decoded.
    CorruptRecord {
        /// The record file.
        path: PathBuf,
        /// Decode failure.
        message: String,
    },
    /// The extracted object no longer matches the digest recorded at install.
    ObjectMismatch {
        /// Plugin name.
        name: String,
        /// Digest recorded at install time.
        expected: String,
        /// Digest of the object on disk, `None` if it is missing.
        actual: Option<String>,
    },
}

impl Inconsistency {
    /// Whether [`repair`] can resolve this finding.
    #[must_use]
    pub fn is_repairable(&self) -> bool {
        !matches!(
            self,
            Self::CorruptRecord { .. } | Self::ObjectMismatch { .. }
        )
    }

    fn sort_key(&self) -> (u8, String) {
        match self {
            Self::Leftover { path, .. } => (0, path.display().to_string()),
            Self::DanglingRecord { name, .. } => (1, name.clone()),
            Self::OrphanDirectory { path } => (2, path.display().to_string()),
            Self::CorruptRecord { path, .. } => (3, path.display().to_string()),
            Self::ObjectMismatch { name, .. } => (4, name.clone()),
        }
    }
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingRecord { name, path, .. } => write!(
                f,
                "plugin '{name}' is registered but {} is missing its image",
                path.display()
            ),
            Self::OrphanDirectory { path } => {
                write!(f, "directory {} has no plugin record", path.display())
            },
            Self::Leftover { kind, path } => {
                write!(f, "leftover {kind} directory {}", path.display())
            },
            Self::CorruptRecord { path, message } => {
                write!(f, "corrupt record {}: {message}", path.display())
            },
            Self::ObjectMismatch {
                name,
                expected,
                actual: Some(actual),
            } => write!(
                f,
                "plugin '{name}' object digest is {actual}, expected {expected}"
            ),
            Self::ObjectMismatch {
                name,
                actual: None,
                ..
            } => write!(f, "plugin '{name}' is missing its compiled object"),
        }
    }
}

/// Outcome of [`repair`].
#[derive(Debug, Clone, Default)]
pub struct Repair {
    /// Findings that were resolved.
    pub repaired: Vec<Inconsistency>,
    /// Findings left for the operator (corrupt records, object mismatches).
    pub unresolved: Vec<Inconsistency>,
}

/// Scan the plugin root and metadata directory for inconsistencies.
///
/// # Errors
///
/// Returns [`PluginError::Io`] if either directory cannot be read.
pub fn verify(store: &MetadataStore) -> PluginResult<Vec<Inconsistency>> {
    Ok(scan(store)?.findings)
}

/// Resolve every repairable finding of [`verify`].
///
/// A backup whose plugin still has a record but lost its directory is moved
/// back into place; other backups, staging and trash directories, orphaned
/// directories and dangling records are removed. Corrupt records and object
/// mismatches are left untouched.
///
/// # Errors
///
/// Returns [`PluginError::Io`] on the first removal or rename that fails.
pub fn repair(store: &MetadataStore) -> PluginResult<Repair> {
    let mut outcome = Repair::default();

    // Backups first: restoring one may resolve a dangling record.
    let first = scan(store)?;
    for finding in first.findings {
        if let Inconsistency::Leftover {
            kind: LeftoverKind::Backup,
            path,
        } = &finding
        {
            resolve_backup(store, &first.record_dirs, path)?;
            outcome.repaired.push(finding);
        }
    }

    for finding in scan(store)?.findings {
        if !finding.is_repairable() {
            outcome.unresolved.push(finding);
            continue;
        }
        match &finding {
            Inconsistency::Leftover { path, .. } => remove_dir(path)?,
            Inconsistency::OrphanDirectory { path } => {
                store.discard_dir(&path.display().to_string(), path)?;
            },
            Inconsistency::DanglingRecord {
                name, path, record, ..
            } => {
                std::fs::remove_file(record)
                    .map_err(PluginError::io(name, Operation::RemoveRecord))?;
                if store.layout().owns(path) {
                    store.discard_dir(name, path)?;
                }
            },
            Inconsistency::CorruptRecord { .. } | Inconsistency::ObjectMismatch { .. } => {},
        }
        info!(finding = %finding, "Repaired plugin registry");
        outcome.repaired.push(finding);
    }

    Ok(outcome)
}

struct Scan {
    findings: Vec<Inconsistency>,
    record_dirs: HashSet<String>,
}

fn scan(store: &MetadataStore) -> PluginResult<Scan> {
    let mut findings = Vec::new();
    let mut record_dirs = HashSet::new();

    for scanned in store.scan_records()? {
        record_dirs.insert(scanned.dir);
        let record = match scanned.record {
            Ok(record) => record,
            Err(message) => {
                findings.push(Inconsistency::CorruptRecord {
                    path: scanned.path,
                    message,
                });
                continue;
            },
        };

        if !record.image_path().is_file() {
            findings.push(Inconsistency::DanglingRecord {
                name: record.name().to_string(),
                path: record.path().to_path_buf(),
                record: scanned.path,
            });
            continue;
        }

        if let Some(expected) = record.object_digest() {
            let actual = match digest_file(&record.object_path()) {
                Ok(digest) => Some(digest),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(PluginError::io(record.name(), Operation::ReadArtifact)(e)),
            };
            if actual.as_deref() != Some(expected) {
                findings.push(Inconsistency::ObjectMismatch {
                    name: record.name().to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
    }

    let root = store.layout().root();
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => Some(entries),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(PluginError::io(&root.display().to_string(), Operation::Scan)(e)),
    };
    for entry in entries.into_iter().flatten() {
        let entry = entry.map_err(PluginError::io(&root.display().to_string(), Operation::Scan))?;
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "Skipping non UTF-8 entry in plugin root");
            continue;
        };
        if let Some(kind) = LeftoverKind::classify(&file_name) {
            findings.push(Inconsistency::Leftover {
                kind,
                path: entry.path(),
            });
        } else if layout::is_plugin_dir_name(&file_name) && !record_dirs.contains(&file_name) {
            findings.push(Inconsistency::OrphanDirectory { path: entry.path() });
        }
    }

    findings.sort_by_key(Inconsistency::sort_key);
    Ok(Scan {
        findings,
        record_dirs,
    })
}

fn resolve_backup(
    store: &MetadataStore,
    record_dirs: &HashSet<String>,
    backup: &Path,
) -> PluginResult<()> {
    let dir = backup
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix(BACKUP_PREFIX))
        .unwrap_or_default();
    let target = store.layout().root().join(dir);

    if layout::is_plugin_dir_name(dir) && record_dirs.contains(dir) && !target.exists() {
        std::fs::rename(backup, &target).map_err(PluginError::io(dir, Operation::SwapDirectory))?;
        info!(path = %target.display(), "Restored plugin directory from backup");
        return Ok(());
    }
    remove_dir(backup)
}

fn remove_dir(path: &Path) -> PluginResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PluginError::io(
            &path.display().to_string(),
            Operation::RemoveDirectory,
        )(e)),
    }
}
