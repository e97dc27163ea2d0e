//! SIF parsing and building errors.

use std::path::PathBuf;

/// Errors from reading or assembling a SIF image.
#[derive(Debug, thiserror::Error)]
pub enum SifError {
    /// The image file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path of the image file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The image exceeds the maximum size this reader accepts.
    #[error("image too large: {size} bytes (limit: {limit} bytes)")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        limit: u64,
    },

    /// The buffer ends before a structure it must contain.
    #[error("truncated image: {what} needs {needed} bytes, only {available} available")]
    Truncated {
        /// Which structure was being read.
        what: &'static str,
        /// Bytes required.
        needed: u64,
        /// Bytes present.
        available: u64,
    },

    /// The magic string is not `SIF_MAGIC`.
    #[error("not a SIF image: bad magic")]
    BadMagic,

    /// The header declares a format version this reader does not know.
    #[error("unsupported SIF version {0:?}")]
    UnsupportedVersion(String),

    /// A header or descriptor field holds an impossible value.
    #[error("invalid {field} value: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i64,
    },

    /// A descriptor points outside the image.
    #[error(
        "descriptor {id} is out of bounds: offset {offset} + size {size} exceeds image size {image_size}"
    )]
    OutOfBounds {
        /// Descriptor ID.
        id: u32,
        /// Declared object offset.
        offset: u64,
        /// Declared object size.
        size: u64,
        /// Total image size.
        image_size: u64,
    },
}

/// Result type for SIF operations.
pub type SifResult<T> = Result<T, SifError>;
