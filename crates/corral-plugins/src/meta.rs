//! Installed-plugin metadata records.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Operation, PluginError, PluginResult};
use crate::layout::{NAME_CONFIG, NAME_IMAGE, NAME_OBJECT};

/// Durable record describing one installed plugin.
///
/// Serialized as one JSON object per plugin. Unknown fields are ignored on
/// read and every field beyond `Name` and `Path` is optional, so records
/// written by older or newer releases still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstalledPlugin {
    name: String,
    path: PathBuf,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    installed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_digest: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

impl InstalledPlugin {
    /// A freshly installed, enabled plugin at `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            enabled: true,
            version: None,
            installed_at: None,
            object_digest: None,
        }
    }

    /// Decode a record from JSON.
    ///
    /// # Errors
    ///
    /// Returns the decode error message when the JSON is malformed or lacks
    /// a required field.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, String> {
        serde_json::from_reader(reader).map_err(|e| e.to_string())
    }

    /// Plugin name as declared by its manifest.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory owned by this plugin.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the plugin is activated at runtime.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Manifest version at install time.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// When the plugin was last installed.
    #[must_use]
    pub fn installed_at(&self) -> Option<DateTime<Utc>> {
        self.installed_at
    }

    /// `blake3:<hex>` digest of the extracted object.
    #[must_use]
    pub fn object_digest(&self) -> Option<&str> {
        self.object_digest.as_deref()
    }

    /// `<path>/plugin.sif`.
    #[must_use]
    pub fn image_path(&self) -> PathBuf {
        self.path.join(NAME_IMAGE)
    }

    /// `<path>/object.so`.
    #[must_use]
    pub fn object_path(&self) -> PathBuf {
        self.path.join(NAME_OBJECT)
    }

    /// `<path>/config.yaml`.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.path.join(NAME_CONFIG)
    }

    /// Open the config file read-only, or `None` if the plugin has none.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if the file exists but cannot be opened.
    pub fn open_config(&self) -> PluginResult<Option<File>> {
        match File::open(self.config_path()) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PluginError::io(&self.name, Operation::ReadArtifact)(e)),
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn with_installed_at(mut self, at: DateTime<Utc>) -> Self {
        self.installed_at = Some(at);
        self
    }

    pub(crate) fn with_object_digest(mut self, digest: String) -> Self {
        self.object_digest = Some(digest);
        self
    }
}

/// `blake3:<hex>` digest of a byte slice.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(bytes).to_hex())
}

/// `blake3:<hex>` digest of a file's contents.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn digest_file(path: &Path) -> std::io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut file = File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths() {
        let record = InstalledPlugin::new("hello", "/opt/app/plugin/hello-0123456789abcdef");
        assert_eq!(
            record.image_path(),
            PathBuf::from("/opt/app/plugin/hello-0123456789abcdef/plugin.sif")
        );
        assert_eq!(
            record.object_path(),
            PathBuf::from("/opt/app/plugin/hello-0123456789abcdef/object.so")
        );
        assert_eq!(
            record.config_path(),
            PathBuf::from("/opt/app/plugin/hello-0123456789abcdef/config.yaml")
        );
        assert!(record.enabled());
    }

    #[test]
    fn minimal_record_defaults_to_enabled() {
        let record =
            InstalledPlugin::from_json_reader(&br#"{"Name":"hello","Path":"/x"}"#[..]).unwrap();
        assert_eq!(record.name(), "hello");
        assert_eq!(record.path(), Path::new("/x"));
        assert!(record.enabled());
        assert_eq!(record.version(), None);
        assert_eq!(record.installed_at(), None);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let record = InstalledPlugin::from_json_reader(
            &br#"{"Name":"hello","Path":"/x","Enabled":false,"Pinned":true}"#[..],
        )
        .unwrap();
        assert!(!record.enabled());
    }

    #[test]
    fn missing_path_is_an_error() {
        let err = InstalledPlugin::from_json_reader(&br#"{"Name":"hello"}"#[..]).unwrap_err();
        assert!(err.contains("Path"));
    }

    #[test]
    fn serialized_field_names() {
        let record = InstalledPlugin::new("hello", "/x")
            .with_version(Some("1.0.0".into()))
            .with_object_digest(digest_bytes(b"obj"));
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Name"], "hello");
        assert_eq!(json["Path"], "/x");
        assert_eq!(json["Enabled"], true);
        assert_eq!(json["Version"], "1.0.0");
        assert!(json["ObjectDigest"].as_str().unwrap().starts_with("blake3:"));
        assert!(json.get("InstalledAt").is_none());
    }

    #[test]
    fn open_config_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let record = InstalledPlugin::new("hello", dir.path());
        assert!(record.open_config().unwrap().is_none());

        std::fs::write(record.config_path(), "key: value\n").unwrap();
        let mut contents = String::new();
        record
            .open_config()
            .unwrap()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "key: value\n");
    }

    #[test]
    fn file_digest_matches_byte_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.so");
        std::fs::write(&path, b"compiled").unwrap();
        assert_eq!(digest_file(&path).unwrap(), digest_bytes(b"compiled"));
    }
}
