//! Assembling SIF images.

use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use crate::descriptor::{
    Arch, DESCRIPTOR_GROUP_MASK, DESCRIPTOR_LEN, DataType, Descriptor, FsType, PartType,
    PartitionInfo,
};
use crate::error::{SifError, SifResult};
use crate::image::{HEADER_LEN, Header, LAUNCH_SCRIPT};

/// A data object to be stored in a new image.
#[derive(Debug, Clone)]
pub struct ObjectInput {
    data_type: DataType,
    name: String,
    data: Vec<u8>,
    partition: Option<PartitionInfo>,
}

impl ObjectInput {
    /// A non-partition object of the given type.
    #[must_use]
    pub fn new(data_type: DataType, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            data_type,
            name: name.into(),
            data,
            partition: None,
        }
    }

    /// A partition object.
    #[must_use]
    pub fn partition(
        name: impl Into<String>,
        data: Vec<u8>,
        fs_type: FsType,
        part_type: PartType,
        arch: Arch,
    ) -> Self {
        Self {
            data_type: DataType::Partition,
            name: name.into(),
            data,
            partition: Some(PartitionInfo {
                fs_type,
                part_type,
                arch,
            }),
        }
    }

    /// A generic JSON object.
    #[must_use]
    pub fn generic_json(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(DataType::GenericJson, name, data)
    }
}

/// Builder for an in-memory SIF image.
///
/// Objects are laid out back to back after a descriptor table sized to
/// exactly the number of objects added.
#[derive(Debug, Clone)]
pub struct SifBuilder {
    arch: Arch,
    id: Option<Uuid>,
    timestamp: Option<i64>,
    objects: Vec<ObjectInput>,
}

impl Default for SifBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SifBuilder {
    /// Start an empty image for the host architecture.
    #[must_use]
    pub fn new() -> Self {
        Self {
            arch: Arch::host(),
            id: None,
            timestamp: None,
            objects: Vec::new(),
        }
    }

    /// Set the header architecture.
    #[must_use]
    pub fn arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    /// Use a fixed image ID instead of a random one.
    #[must_use]
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Use a fixed creation/modification time instead of now.
    #[must_use]
    pub fn timestamp(mut self, unix_secs: i64) -> Self {
        self.timestamp = Some(unix_secs);
        self
    }

    /// Append a data object.
    #[must_use]
    pub fn add_object(mut self, object: ObjectInput) -> Self {
        self.objects.push(object);
        self
    }

    /// Serialize the image.
    ///
    /// # Errors
    ///
    /// Returns [`SifError::TooLarge`] if the objects do not fit in the
    /// format's signed 64-bit offsets.
    pub fn build(self) -> SifResult<Vec<u8>> {
        let now = self.timestamp.unwrap_or_else(|| Utc::now().timestamp());
        let count = self.objects.len();
        let too_large = || SifError::TooLarge {
            size: u64::MAX,
            limit: u64::try_from(i64::MAX).unwrap_or(u64::MAX),
        };

        let table_len = count.checked_mul(DESCRIPTOR_LEN).ok_or_else(too_large)?;
        let data_offset = HEADER_LEN.checked_add(table_len).ok_or_else(too_large)?;

        let mut descriptors = Vec::with_capacity(count);
        let mut cursor = data_offset;
        for (id, object) in (1u32..).zip(&self.objects) {
            let size = object.data.len();
            descriptors.push(Descriptor {
                data_type: object.data_type,
                id,
                group_id: DESCRIPTOR_GROUP_MASK | 1,
                link: 0,
                offset: as_u64(cursor),
                size: as_u64(size),
                store_size: as_u64(size),
                ctime: now,
                mtime: now,
                uid: 0,
                gid: 0,
                name: object.name.clone(),
                partition: object.partition,
            });
            cursor = cursor.checked_add(size).ok_or_else(too_large)?;
        }
        let data_len = cursor.checked_sub(data_offset).ok_or_else(too_large)?;

        let header = Header {
            launch: LAUNCH_SCRIPT.to_string(),
            arch: self.arch,
            id: self.id.unwrap_or_else(Uuid::new_v4),
            ctime: now,
            mtime: now,
            descriptors_free: 0,
            descriptors_total: as_u64(count),
            descriptors_offset: as_u64(HEADER_LEN),
            descriptors_len: as_u64(table_len),
            data_offset: as_u64(data_offset),
            data_len: as_u64(data_len),
        };

        let mut out = Vec::with_capacity(cursor);
        out.extend_from_slice(&header.encode()?);
        for descriptor in &descriptors {
            out.extend_from_slice(&descriptor.encode()?);
        }
        for object in &self.objects {
            out.extend_from_slice(&object.data);
        }
        Ok(out)
    }

    /// Serialize the image and write it to `path`.
    ///
    /// # Errors
    ///
    /// Returns any [`SifBuilder::build`] error, or [`SifError::Io`] if the
    /// file cannot be written.
    pub fn write_to(self, path: &Path) -> SifResult<()> {
        let bytes = self.build()?;
        std::fs::write(path, bytes).map_err(|source| SifError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}
