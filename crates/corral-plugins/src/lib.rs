//! Plugin installation and on-disk registry for the Corral container runtime.
//!
//! A plugin ships as a SIF image carrying a compiled object (raw data
//! partition) and a JSON manifest. This crate provides:
//!
//! - [`validate`] / [`is_plugin_image`]: structural check of a plugin image
//! - [`read_manifest`]: decode the manifest section into a [`Manifest`]
//! - [`PluginLayout`]: deterministic per-plugin paths under `<libexec>/plugin`
//! - [`Installer`] / [`install`]: stage, swap and register a plugin
//! - [`MetadataStore`]: load, list, enable/disable and delete plugin records
//! - [`verify`] / [`repair`]: detect and clean up interrupted work
//! - [`activate`]: hand enabled plugins to an [`ObjectLoader`]
//! - [`PluginLock`]: advisory lock serializing operations on one plugin
//!
//! # Consistency
//!
//! Every mutation leaves the registry either fully before or fully after the
//! operation as seen through [`MetadataStore`]. Crash leftovers are hidden
//! directories in the plugin root that [`verify`] reports.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod image;
pub mod installer;
pub mod layout;
pub mod loader;
pub mod lock;
pub mod manifest;
pub mod meta;
pub mod store;
pub mod verify;

pub use error::{InvalidImage, Operation, PluginError, PluginResult};
pub use image::{PluginImage, SectionRole, is_plugin_image, open_image, validate, validate_bytes};
pub use installer::{Installer, install};
pub use layout::{PluginLayout, dir_name, install_path, slug};
pub use loader::{Activation, ActivationFailure, ObjectLoader, activate, activate_locked};
pub use lock::PluginLock;
pub use manifest::{Manifest, read_manifest};
pub use meta::{InstalledPlugin, digest_bytes, digest_file};
pub use store::{CorruptRecord, Listing, MetadataStore};
pub use verify::{Inconsistency, LeftoverKind, Repair, repair, verify};
