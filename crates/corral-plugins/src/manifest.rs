//! Plugin manifest types.
//!
//! The manifest is the generic-JSON section of a plugin image. It declares
//! the plugin's identity and, optionally, the default contents of its
//! `config.yaml`.

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};
use crate::image::{PluginImage, SectionRole};
use crate::layout;

/// Identity and metadata declared inside a plugin image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Plugin name, e.g. `"github.com/example/log-plugin"`.
    pub name: String,
    /// Optional version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Optional author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default configuration, written as YAML on first install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl Manifest {
    /// A manifest with only a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            author: None,
            description: None,
            config: None,
        }
    }

    /// Decode and validate manifest JSON. Surrounding whitespace is trimmed
    /// from the name; unknown fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] for invalid JSON, a missing or
    /// unusable name, or a non-object `config`.
    pub fn from_json(bytes: &[u8]) -> PluginResult<Self> {
        let mut manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| PluginError::manifest(format!("failed to decode manifest JSON: {e}")))?;
        manifest.name = manifest.name.trim().to_string();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the fields the installer relies on.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] describing the first problem.
    pub fn validate(&self) -> PluginResult<()> {
        if self.name.is_empty() {
            return Err(PluginError::manifest("plugin name must not be empty"));
        }
        if self.name.chars().any(char::is_control) {
            return Err(PluginError::manifest(format!(
                "plugin name contains control characters: {:?}",
                self.name
            )));
        }
        if layout::dir_name(&self.name).is_none() {
            return Err(PluginError::manifest(format!(
                "plugin name {:?} has no filesystem-safe characters",
                self.name
            )));
        }
        if let Some(config) = &self.config
            && !config.is_object()
        {
            return Err(PluginError::manifest(
                "manifest config must be a JSON object",
            ));
        }
        Ok(())
    }

    /// Contents of the `config.yaml` written on first install.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] if the config cannot be rendered.
    pub fn default_config(&self) -> PluginResult<String> {
        let header = format!("# Configuration for plugin {}\n", self.name);
        match &self.config {
            Some(config) => {
                let body = serde_yaml::to_string(config).map_err(|e| {
                    PluginError::manifest(format!("failed to render default config: {e}"))
                })?;
                Ok(format!("{header}{body}"))
            },
            None => Ok(header),
        }
    }
}

/// Locate the manifest section of an image and decode it.
///
/// # Errors
///
/// Returns [`PluginError::Manifest`] if the image has no manifest section or
/// the section fails [`Manifest::from_json`].
pub fn read_manifest<I: PluginImage + ?Sized>(image: &I) -> PluginResult<Manifest> {
    let bytes = image
        .section_bytes(SectionRole::Manifest)
        .ok_or_else(|| PluginError::manifest("image has no manifest section"))?;
    Manifest::from_json(bytes)
}
