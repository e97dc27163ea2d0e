//! Plugin image validation.
//!
//! A plugin image is a SIF container holding exactly two required sections:
//!
//! ```text
//! Object:   Datatype = Partition, Fstype = Raw, Parttype = Data
//! Manifest: Datatype = GenericJSON
//! ```
//!
//! Sections are located by role, never by position, so images carrying
//! additional sections (signatures, labels...) remain valid.

use std::fmt;
use std::path::Path;

use corral_sif::{DataType, Descriptor, FsType, PartType, SifError, SifImage};

use crate::error::{InvalidImage, Operation, PluginError, PluginResult};

/// Role a section plays in a plugin image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionRole {
    /// The compiled extension object (raw data partition).
    Object,
    /// The plugin manifest (generic JSON).
    Manifest,
}

impl SectionRole {
    /// Both roles a plugin image must contain.
    pub const REQUIRED: [Self; 2] = [Self::Object, Self::Manifest];

    /// Whether a SIF descriptor fills this role.
    #[must_use]
    pub fn matches(self, descriptor: &Descriptor) -> bool {
        match self {
            Self::Object => descriptor.is_partition(FsType::Raw, PartType::Data),
            Self::Manifest => descriptor.data_type == DataType::GenericJson,
        }
    }
}

impl fmt::Display for SectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => f.write_str("compiled object (raw data partition)"),
            Self::Manifest => f.write_str("manifest (generic JSON)"),
        }
    }
}

/// Read access to the sections of a container image.
pub trait PluginImage {
    /// Number of sections filling `role`.
    fn section_count(&self, role: SectionRole) -> usize;

    /// Bytes of the first section filling `role`.
    fn section_bytes(&self, role: SectionRole) -> Option<&[u8]>;

    /// The complete image, as stored on disk.
    fn image_bytes(&self) -> &[u8];

    /// Whether at least one section fills `role`.
    fn has_section(&self, role: SectionRole) -> bool {
        self.section_count(role) > 0
    }
}

impl PluginImage for SifImage {
    fn section_count(&self, role: SectionRole) -> usize {
        self.descriptors().iter().filter(|d| role.matches(d)).count()
    }

    fn section_bytes(&self, role: SectionRole) -> Option<&[u8]> {
        self.descriptors()
            .iter()
            .find(|d| role.matches(d))
            .map(|d| self.object_data(d))
    }

    fn image_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Check that an image is a well-formed plugin package.
///
/// Read-only; safe to use as a pre-flight gate before any filesystem writes.
///
/// # Errors
///
/// Returns the first [`InvalidImage`] reason found, checking the object
/// section before the manifest.
pub fn validate<I: PluginImage + ?Sized>(image: &I) -> Result<(), InvalidImage> {
    for role in SectionRole::REQUIRED {
        match image.section_count(role) {
            0 => return Err(InvalidImage::MissingSection(role)),
            1 => {},
            count => return Err(InvalidImage::DuplicateSection { role, count }),
        }
        if image.section_bytes(role).is_none_or(<[u8]>::is_empty) {
            return Err(InvalidImage::EmptySection(role));
        }
    }
    Ok(())
}

/// Whether an image is a well-formed plugin package.
#[must_use]
pub fn is_plugin_image<I: PluginImage + ?Sized>(image: &I) -> bool {
    validate(image).is_ok()
}

/// Parse raw bytes as a SIF image and validate it as a plugin.
///
/// # Errors
///
/// Returns [`InvalidImage::Malformed`] if the bytes are not a SIF image,
/// or the validation failure otherwise.
pub fn validate_bytes(bytes: Vec<u8>) -> Result<SifImage, InvalidImage> {
    let image = SifImage::from_bytes(bytes)?;
    validate(&image)?;
    Ok(image)
}

/// Open an image file for installation.
///
/// Structural parse failures surface as [`PluginError::InvalidImage`];
/// the image is not validated as a plugin yet.
///
/// # Errors
///
/// Returns [`PluginError::Io`] if the file cannot be read.
pub fn open_image(path: &Path) -> PluginResult<SifImage> {
    SifImage::open(path).map_err(|e| match e {
        SifError::Io { source, .. } => PluginError::Io {
            name: path.display().to_string(),
            operation: Operation::ReadImage,
            source,
        },
        other => PluginError::InvalidImage(InvalidImage::Malformed(other)),
    })
}

#[cfg(test)]
mod tests {
    use corral_sif::{Arch, ObjectInput, SifBuilder};
    use corral_test::fixtures::{object_partition, plugin_image_bytes, sample_manifest_json};

    use super::*;

    fn image_from(builder: SifBuilder) -> SifImage {
        SifImage::from_bytes(builder.build().unwrap()).unwrap()
    }

    #[test]
    fn valid_plugin_image_passes() {
        let image = validate_bytes(plugin_image_bytes("hello")).unwrap();
        assert!(is_plugin_image(&image));
        assert!(image.has_section(SectionRole::Object));
        assert!(image.has_section(SectionRole::Manifest));
    }

    #[test]
    fn missing_manifest_is_reported() {
        let image = image_from(SifBuilder::new().add_object(object_partition(b"obj")));
        assert!(matches!(
            validate(&image),
            Err(InvalidImage::MissingSection(SectionRole::Manifest))
        ));
    }

    #[test]
    fn missing_object_is_reported() {
        let image = image_from(
            SifBuilder::new()
                .add_object(ObjectInput::generic_json("m", sample_manifest_json("x"))),
        );
        assert!(matches!(
            validate(&image),
            Err(InvalidImage::MissingSection(SectionRole::Object))
        ));
    }

    #[test]
    fn squashfs_partition_does_not_count_as_object() {
        let image = image_from(
            SifBuilder::new()
                .add_object(ObjectInput::partition(
                    "rootfs",
                    b"hsqs".to_vec(),
                    FsType::Squash,
                    PartType::Data,
                    Arch::Amd64,
                ))
                .add_object(ObjectInput::generic_json("m", sample_manifest_json("x"))),
        );
        assert!(matches!(
            validate(&image),
            Err(InvalidImage::MissingSection(SectionRole::Object))
        ));
    }

    #[test]
    fn duplicate_manifest_is_rejected() {
        let image = image_from(
            SifBuilder::new()
                .add_object(object_partition(b"obj"))
                .add_object(ObjectInput::generic_json("a", sample_manifest_json("a")))
                .add_object(ObjectInput::generic_json("b", sample_manifest_json("b"))),
        );
        assert!(matches!(
            validate(&image),
            Err(InvalidImage::DuplicateSection {
                role: SectionRole::Manifest,
                count: 2
            })
        ));
    }

    #[test]
    fn empty_object_is_rejected() {
        let image = image_from(
            SifBuilder::new()
                .add_object(object_partition(b""))
                .add_object(ObjectInput::generic_json("m", sample_manifest_json("x"))),
        );
        assert!(matches!(
            validate(&image),
            Err(InvalidImage::EmptySection(SectionRole::Object))
        ));
    }

    #[test]
    fn extra_sections_are_tolerated_in_any_order() {
        let image = image_from(
            SifBuilder::new()
                .add_object(ObjectInput::new(DataType::Labels, "labels", b"{}".to_vec()))
                .add_object(ObjectInput::generic_json("m", sample_manifest_json("x")))
                .add_object(ObjectInput::new(DataType::Signature, "sig", vec![1, 2, 3]))
                .add_object(object_partition(b"obj")),
        );
        assert!(validate(&image).is_ok());
        assert_eq!(image.section_bytes(SectionRole::Object), Some(&b"obj"[..]));
    }

    #[test]
    fn garbage_bytes_are_malformed_not_panics() {
        for input in [vec![], vec![0u8; 7], vec![0xaa; 4096], b"SIF_MAGIC".to_vec()] {
            assert!(matches!(
                validate_bytes(input),
                Err(InvalidImage::Malformed(_))
            ));
        }
    }

    #[test]
    fn open_image_maps_missing_file_to_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_image(&dir.path().join("absent.sif")).unwrap_err();
        assert!(matches!(
            err,
            PluginError::Io {
                operation: Operation::ReadImage,
                ..
            }
        ));
    }

    #[test]
    fn open_image_maps_garbage_to_invalid_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.sif");
        std::fs::write(&path, b"definitely not a container").unwrap();
        let err = open_image(&path).unwrap_err();
        assert!(matches!(err, PluginError::InvalidImage(InvalidImage::Malformed(_))));
    }
}
