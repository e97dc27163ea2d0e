//! Scratch install roots and test logging.

use std::path::Path;
use std::sync::Once;

use tempfile::TempDir;

/// A temporary libexec directory, removed on drop.
#[derive(Debug)]
pub struct ScratchLibexec {
    dir: TempDir,
}

impl ScratchLibexec {
    /// Create an empty libexec root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// The libexec root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Names of the entries directly under `<libexec>/plugin`, sorted.
    #[must_use]
    pub fn plugin_root_entries(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.dir.path().join("plugin")) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for ScratchLibexec {
    fn default() -> Self {
        Self::new()
    }
}

static LOGGING: Once = Once::new();

/// Route `tracing` output to the test harness, honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
