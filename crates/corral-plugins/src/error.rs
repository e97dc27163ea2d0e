//! Plugin error types.

use std::fmt;
use std::path::PathBuf;

use corral_sif::SifError;

use crate::image::SectionRole;

/// Errors from plugin installation and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The image is not a well-formed plugin package.
    #[error("invalid plugin image: {0}")]
    InvalidImage(#[from] InvalidImage),

    /// The manifest section is unreadable or missing a required field.
    #[error("manifest error: {message}")]
    Manifest {
        /// What is wrong with the manifest.
        message: String,
    },

    /// The derived install path belongs to a different plugin.
    #[error("plugin '{name}' resolves to {path}, which is already owned by plugin '{existing}'")]
    NameCollision {
        /// Name of the plugin being installed.
        name: String,
        /// Name recorded for the plugin already at the path.
        existing: String,
        /// The contested install path.
        path: PathBuf,
    },

    /// No plugin with this name is installed.
    #[error("plugin not found: {0}")]
    NotFound(String),

    /// An existing metadata record cannot be decoded.
    #[error("corrupt plugin record at {path}: {message}")]
    CorruptRecord {
        /// Path of the record file.
        path: PathBuf,
        /// Decode failure.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error while {operation} for plugin '{name}': {source}")]
    Io {
        /// Plugin the operation was performed for.
        name: String,
        /// The step that failed.
        operation: Operation,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl PluginError {
    /// Build a `map_err` adapter for an I/O failure during `operation`.
    pub(crate) fn io(name: &str, operation: Operation) -> impl FnOnce(std::io::Error) -> Self {
        let name = name.to_string();
        move |source| Self::Io {
            name,
            operation,
            source,
        }
    }

    pub(crate) fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }
}

/// Filesystem step during which an [`PluginError::Io`] occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Reading a plugin image file.
    ReadImage,
    /// Resolving the absolute plugin root.
    ResolvePath,
    /// Creating the staging directory.
    CreateStaging,
    /// Writing the stored image copy.
    WriteImage,
    /// Writing the extracted compiled object.
    ExtractObject,
    /// Writing or carrying over the config file.
    WriteConfig,
    /// Moving the staged directory into place.
    SwapDirectory,
    /// Reading a metadata record.
    ReadRecord,
    /// Writing a metadata record.
    WriteRecord,
    /// Removing a metadata record.
    RemoveRecord,
    /// Removing a plugin directory.
    RemoveDirectory,
    /// Acquiring the per-plugin lock.
    Lock,
    /// Scanning the plugin root.
    Scan,
    /// Reading an installed artifact.
    ReadArtifact,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadImage => "reading plugin image",
            Self::ResolvePath => "resolving install path",
            Self::CreateStaging => "creating staging directory",
            Self::WriteImage => "writing image copy",
            Self::ExtractObject => "extracting compiled object",
            Self::WriteConfig => "writing config file",
            Self::SwapDirectory => "moving plugin directory into place",
            Self::ReadRecord => "reading metadata record",
            Self::WriteRecord => "writing metadata record",
            Self::RemoveRecord => "removing metadata record",
            Self::RemoveDirectory => "removing plugin directory",
            Self::Lock => "acquiring plugin lock",
            Self::Scan => "scanning plugin directory",
            Self::ReadArtifact => "reading installed artifact",
        })
    }
}

/// Reasons an image is not a valid plugin package.
#[derive(Debug, thiserror::Error)]
pub enum InvalidImage {
    /// A required section is absent.
    #[error("missing {0} section")]
    MissingSection(SectionRole),

    /// A required section appears more than once.
    #[error("expected exactly one {role} section, found {count}")]
    DuplicateSection {
        /// The duplicated role.
        role: SectionRole,
        /// Number of sections found.
        count: usize,
    },

    /// A required section holds no data.
    #[error("{0} section is empty")]
    EmptySection(SectionRole),

    /// The bytes are not a readable container image.
    #[error("malformed image: {0}")]
    Malformed(#[from] SifError),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
