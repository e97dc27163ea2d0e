//! Runtime activation of enabled plugins.
//!
//! Loading a compiled object is the host's business; this module only picks
//! what to load and checks it is the object that was installed.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::lock::PluginLock;
use crate::meta::{InstalledPlugin, digest_file};
use crate::store::{CorruptRecord, MetadataStore};

/// Loads a plugin's compiled object into the host process.
pub trait ObjectLoader {
    /// Handle to a loaded plugin.
    type Handle;
    /// Load failure.
    type Error: fmt::Display;

    /// Load the object at [`InstalledPlugin::object_path`].
    ///
    /// # Errors
    ///
    /// Implementation defined.
    fn load(&self, plugin: &InstalledPlugin) -> Result<Self::Handle, Self::Error>;
}

/// A plugin that was enabled but could not be activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationFailure {
    /// Plugin name.
    pub name: String,
    /// Why activation failed.
    pub reason: String,
}

/// Result of [`activate`].
#[derive(Debug)]
pub struct Activation<H> {
    /// Loaded plugins in name order.
    pub loaded: Vec<(InstalledPlugin, H)>,
    /// Enabled plugins that failed to load.
    pub failed: Vec<ActivationFailure>,
    /// Records skipped because they could not be decoded.
    pub corrupt: Vec<CorruptRecord>,
}

/// Load every enabled plugin, in name order.
///
/// A plugin whose object no longer matches the digest recorded at install is
/// not handed to the loader. One plugin failing never stops the others.
///
/// The registry is read without taking any [`PluginLock`]. A plugin being
/// re-installed at the same moment can briefly lack its directory and is
/// then reported in [`Activation::failed`]. Use [`activate_locked`] when
/// installs may run concurrently.
///
/// # Errors
///
/// Returns [`crate::PluginError::Io`] if the registry cannot be read.
pub fn activate<L: ObjectLoader + ?Sized>(
    store: &MetadataStore,
    loader: &L,
) -> PluginResult<Activation<L::Handle>> {
    run(store, loader, false)
}

/// Like [`activate`], but each plugin is checked and loaded while holding
/// its [`PluginLock`], against a record re-read under the lock. Installs,
/// enables and deletes of that plugin wait until it is loaded.
///
/// # Errors
///
/// Returns [`crate::PluginError::Io`] if the registry cannot be read.
pub fn activate_locked<L: ObjectLoader + ?Sized>(
    store: &MetadataStore,
    loader: &L,
) -> PluginResult<Activation<L::Handle>> {
    run(store, loader, true)
}

fn run<L: ObjectLoader + ?Sized>(
    store: &MetadataStore,
    loader: &L,
    locked: bool,
) -> PluginResult<Activation<L::Handle>> {
    let listing = store.load_all()?;
    let mut activation = Activation {
        loaded: Vec::new(),
        failed: Vec::new(),
        corrupt: listing.corrupt,
    };

    for listed in listing.plugins {
        if !listed.enabled() {
            debug!(plugin = listed.name(), "Skipping disabled plugin");
            continue;
        }

        let (plugin, _lock) = if locked {
            let lock = match PluginLock::acquire(store.layout(), listed.name()) {
                Ok(lock) => lock,
                Err(e) => {
                    activation.fail(listed.name(), e.to_string());
                    continue;
                },
            };
            match store.load(listed.name()) {
                Ok(current) if current.enabled() => (current, Some(lock)),
                Ok(_) | Err(PluginError::NotFound(_)) => {
                    debug!(plugin = listed.name(), "Plugin disabled or removed while waiting for its lock");
                    continue;
                },
                Err(PluginError::CorruptRecord { path, message }) => {
                    activation.corrupt.push(CorruptRecord { path, message });
                    continue;
                },
                Err(e) => return Err(e),
            }
        } else {
            (listed, None)
        };

        if let Err(reason) = check_object(&plugin) {
            warn!(plugin = plugin.name(), reason = %reason, "Refusing to load plugin");
            activation.fail(plugin.name(), reason);
            continue;
        }
        match loader.load(&plugin) {
            Ok(handle) => {
                info!(plugin = plugin.name(), "Loaded plugin");
                activation.loaded.push((plugin, handle));
            },
            Err(e) => {
                warn!(plugin = plugin.name(), error = %e, "Failed to load plugin");
                activation.fail(plugin.name(), e.to_string());
            },
        }
    }

    Ok(activation)
}

impl<H> Activation<H> {
    fn fail(&mut self, name: &str, reason: String) {
        self.failed.push(ActivationFailure {
            name: name.to_string(),
            reason,
        });
    }
}

fn check_object(plugin: &InstalledPlugin) -> Result<(), String> {
    let actual = digest_file(&plugin.object_path())
        .map_err(|e| format!("cannot read {}: {e}", plugin.object_path().display()))?;
    match plugin.object_digest() {
        Some(expected) if expected != actual => Err(format!(
            "object digest {actual} does not match installed digest {expected}"
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use corral_test::{ScratchLibexec, plugin_image};

    use super::*;
    use crate::installer::Installer;

    /// Records load calls; fails for names listed in `reject`.
    #[derive(Default)]
    struct RecordingLoader {
        calls: RefCell<Vec<String>>,
        reject: Vec<&'static str>,
    }

    impl ObjectLoader for RecordingLoader {
        type Handle = Vec<u8>;
        type Error = String;

        fn load(&self, plugin: &InstalledPlugin) -> Result<Vec<u8>, String> {
            self.calls.borrow_mut().push(plugin.name().to_string());
            if self.reject.iter().any(|r| *r == plugin.name()) {
                return Err("undefined symbol: plugin_init".to_string());
            }
            std::fs::read(plugin.object_path()).map_err(|e| e.to_string())
        }
    }

    fn setup() -> (ScratchLibexec, Installer) {
        let libexec = ScratchLibexec::new();
        let installer = Installer::new(libexec.path()).unwrap();
        (libexec, installer)
    }

    #[test]
    fn loads_enabled_plugins_in_name_order() {
        let (_libexec, installer) = setup();
        for name in ["zeta", "alpha", "off"] {
            installer.install(&plugin_image(name)).unwrap();
        }
        installer.store().set_enabled("off", false).unwrap();

        let loader = RecordingLoader::default();
        let activation = activate(installer.store(), &loader).unwrap();

        assert_eq!(*loader.calls.borrow(), ["alpha", "zeta"]);
        assert_eq!(activation.loaded.len(), 2);
        assert_eq!(
            activation.loaded[0].1,
            corral_test::sample_object("alpha")
        );
        assert!(activation.failed.is_empty());
    }

    #[test]
    fn load_failure_does_not_stop_others() {
        let (_libexec, installer) = setup();
        installer.install(&plugin_image("bad")).unwrap();
        installer.install(&plugin_image("good")).unwrap();

        let loader = RecordingLoader {
            reject: vec!["bad"],
            ..RecordingLoader::default()
        };
        let activation = activate(installer.store(), &loader).unwrap();

        assert_eq!(activation.loaded.len(), 1);
        assert_eq!(activation.loaded[0].0.name(), "good");
        assert_eq!(activation.failed.len(), 1);
        assert_eq!(activation.failed[0].name, "bad");
        assert!(activation.failed[0].reason.contains("plugin_init"));
    }

    #[test]
    fn tampered_object_is_never_loaded() {
        let (_libexec, installer) = setup();
        let record = installer.install(&plugin_image("hello")).unwrap();
        std::fs::write(record.object_path(), b"swapped").unwrap();

        let loader = RecordingLoader::default();
        let activation = activate(installer.store(), &loader).unwrap();

        assert!(loader.calls.borrow().is_empty());
        assert!(activation.loaded.is_empty());
        assert!(activation.failed[0].reason.contains("does not match"));
    }

    #[test]
    fn corrupt_records_are_reported() {
        let (_libexec, installer) = setup();
        installer.install(&plugin_image("hello")).unwrap();
        let bad = installer.store().layout().record_path("other").unwrap();
        std::fs::write(&bad, b"[").unwrap();

        let activation = activate(installer.store(), &RecordingLoader::default()).unwrap();
        assert_eq!(activation.loaded.len(), 1);
        assert_eq!(activation.corrupt.len(), 1);
        assert_eq!(activation.corrupt[0].path, bad);
    }

    #[test]
    fn locked_activation_waits_for_reinstall_to_finish() {
        let (_libexec, installer) = setup();
        let record = installer.install(&plugin_image("hello")).unwrap();
        let guard = PluginLock::acquire(installer.store().layout(), "hello").unwrap();

        // Mid-swap: the record exists but its directory is moved away.
        let parked = record.path().with_extension("parked");
        std::fs::rename(record.path(), &parked).unwrap();

        let store = installer.store().clone();
        let activating = std::thread::spawn(move || {
            let activation = activate_locked(&store, &RecordingLoader::default()).unwrap();
            (activation.loaded.len(), activation.failed.len())
        });
        std::thread::sleep(std::time::Duration::from_millis(100));
        std::fs::rename(&parked, record.path()).unwrap();
        drop(guard);

        assert_eq!(activating.join().unwrap(), (1, 0));
    }

    #[test]
    fn locked_activation_releases_locks() {
        let (_libexec, installer) = setup();
        installer.install(&plugin_image("alpha")).unwrap();
        installer.install(&plugin_image("off")).unwrap();
        installer.store().set_enabled("off", false).unwrap();

        let loader = RecordingLoader::default();
        let activation = activate_locked(installer.store(), &loader).unwrap();

        assert_eq!(*loader.calls.borrow(), ["alpha"]);
        assert_eq!(activation.loaded.len(), 1);
        let layout = installer.store().layout();
        assert!(PluginLock::try_acquire(layout, "alpha").unwrap().is_some());
    }
}
