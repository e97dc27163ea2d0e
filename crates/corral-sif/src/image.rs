//! SIF global header and image reader.

use std::path::Path;

use tracing::debug;
use uuid::Uuid;

use crate::descriptor::{
    Arch, ByteReader, DESCRIPTOR_LEN, DataType, Descriptor, FsType, PartType, decode_str,
    encode_str, non_negative, to_i64, trim_nul,
};
use crate::error::{SifError, SifResult};

/// Encoded size of the global header in bytes.
pub const HEADER_LEN: usize = 128;

/// Magic string identifying a SIF image.
pub const SIF_MAGIC: &[u8] = b"SIF_MAGIC";

/// The only format version this reader understands.
pub const SIF_VERSION: &[u8] = b"01";

/// Default launch script written at the start of every image.
pub const LAUNCH_SCRIPT: &str = "#!/usr/bin/env run-singularity\n";

/// Largest image this reader will load into memory (256 MiB).
pub const MAX_IMAGE_SIZE: u64 = 256 * 1024 * 1024;

const LAUNCH_LEN: usize = 32;
const MAGIC_LEN: usize = 10;

/// The SIF global header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Shebang line that lets the image be executed directly.
    pub launch: String,
    /// Architecture of the primary system partition.
    pub arch: Arch,
    /// Unique image ID.
    pub id: Uuid,
    /// Creation time (Unix seconds).
    pub ctime: i64,
    /// Modification time (Unix seconds).
    pub mtime: i64,
    /// Number of free descriptor slots.
    pub descriptors_free: u64,
    /// Total number of descriptor slots.
    pub descriptors_total: u64,
    /// Offset of the descriptor table.
    pub descriptors_offset: u64,
    /// Length of the descriptor table in bytes.
    pub descriptors_len: u64,
    /// Offset of the data region.
    pub data_offset: u64,
    /// Length of the data region in bytes.
    pub data_len: u64,
}

impl Header {
    fn decode(buf: &[u8]) -> SifResult<Self> {
        let mut r = ByteReader::new(buf, "header");
        let launch = decode_str(r.take(LAUNCH_LEN)?);
        let magic = r.take(MAGIC_LEN)?;
        if trim_nul(magic) != SIF_MAGIC {
            return Err(SifError::BadMagic);
        }
        let version = r.take(3)?;
        if trim_nul(version) != SIF_VERSION {
            return Err(SifError::UnsupportedVersion(decode_str(version)));
        }
        let arch = Arch::from_code(r.take(3)?);
        let id = Uuid::from_bytes(r.array()?);

        Ok(Self {
            launch,
            arch,
            id,
            ctime: r.i64()?,
            mtime: r.i64()?,
            descriptors_free: non_negative("header dfree", r.i64()?)?,
            descriptors_total: non_negative("header dtotal", r.i64()?)?,
            descriptors_offset: non_negative("header descroff", r.i64()?)?,
            descriptors_len: non_negative("header descrlen", r.i64()?)?,
            data_offset: non_negative("header dataoff", r.i64()?)?,
            data_len: non_negative("header datalen", r.i64()?)?,
        })
    }

    pub(crate) fn encode(&self) -> SifResult<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&encode_str::<LAUNCH_LEN>(&self.launch));
        out.extend_from_slice(&encode_str::<MAGIC_LEN>("SIF_MAGIC"));
        out.extend_from_slice(&encode_str::<3>("01"));
        out.extend_from_slice(&encode_str::<3>(self.arch.code()));
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(&self.ctime.to_le_bytes());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        for (field, value) in [
            ("header dfree", self.descriptors_free),
            ("header dtotal", self.descriptors_total),
            ("header descroff", self.descriptors_offset),
            ("header descrlen", self.descriptors_len),
            ("header dataoff", self.data_offset),
            ("header datalen", self.data_len),
        ] {
            out.extend_from_slice(&to_i64(field, value)?.to_le_bytes());
        }
        Ok(out)
    }
}

/// A SIF image held in memory.
///
/// Parsing validates the header, the descriptor table and every used
/// descriptor's data range up front, so accessors never fail afterwards.
#[derive(Debug, Clone)]
pub struct SifImage {
    header: Header,
    descriptors: Vec<Descriptor>,
    data: Vec<u8>,
}

impl SifImage {
    /// Read and parse an image file.
    ///
    /// # Errors
    ///
    /// Returns [`SifError::Io`] if the file cannot be read,
    /// [`SifError::TooLarge`] past [`MAX_IMAGE_SIZE`], or any parse error
    /// from [`SifImage::from_bytes`].
    pub fn open(path: &Path) -> SifResult<Self> {
        let io_err = |source| SifError::Io {
            path: path.to_path_buf(),
            source,
        };
        let size = std::fs::metadata(path).map_err(io_err)?.len();
        if size > MAX_IMAGE_SIZE {
            return Err(SifError::TooLarge {
                size,
                limit: MAX_IMAGE_SIZE,
            });
        }
        let data = std::fs::read(path).map_err(io_err)?;
        let image = Self::from_bytes(data)?;
        debug!(
            path = %path.display(),
            descriptors = image.descriptors.len(),
            "Opened SIF image"
        );
        Ok(image)
    }

    /// Parse an image from an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`SifError`] describing the first structural problem found.
    /// Arbitrary input never panics.
    pub fn from_bytes(data: Vec<u8>) -> SifResult<Self> {
        let image_size = u64::try_from(data.len()).unwrap_or(u64::MAX);
        if image_size > MAX_IMAGE_SIZE {
            return Err(SifError::TooLarge {
                size: image_size,
                limit: MAX_IMAGE_SIZE,
            });
        }

        let header = Header::decode(&data)?;

        let total = usize::try_from(header.descriptors_total).map_err(|_| {
            SifError::InvalidField {
                field: "header dtotal",
                value: i64::MAX,
            }
        })?;
        let table_len = total
            .checked_mul(DESCRIPTOR_LEN)
            .ok_or(SifError::InvalidField {
                field: "header dtotal",
                value: to_i64("header dtotal", header.descriptors_total).unwrap_or(i64::MAX),
            })?;
        let table_start = usize::try_from(header.descriptors_offset).unwrap_or(usize::MAX);
        let table = table_start
            .checked_add(table_len)
            .and_then(|end| data.get(table_start..end))
            .ok_or(SifError::Truncated {
                what: "descriptor table",
                needed: header
                    .descriptors_offset
                    .saturating_add(u64::try_from(table_len).unwrap_or(u64::MAX)),
                available: image_size,
            })?;

        let mut descriptors = Vec::new();
        for slot in table.chunks_exact(DESCRIPTOR_LEN) {
            let Some(descriptor) = Descriptor::decode(slot)? else {
                continue;
            };
            let in_bounds = descriptor
                .offset
                .checked_add(descriptor.size)
                .is_some_and(|end| end <= image_size);
            if !in_bounds {
                return Err(SifError::OutOfBounds {
                    id: descriptor.id,
                    offset: descriptor.offset,
                    size: descriptor.size,
                    image_size,
                });
            }
            descriptors.push(descriptor);
        }

        Ok(Self {
            header,
            descriptors,
            data,
        })
    }

    /// The global header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// All used descriptors, in table order.
    #[must_use]
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// The complete raw image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The data bytes of a descriptor belonging to this image.
    #[must_use]
    pub fn object_data(&self, descriptor: &Descriptor) -> &[u8] {
        let start = usize::try_from(descriptor.offset).unwrap_or(usize::MAX);
        let len = usize::try_from(descriptor.size).unwrap_or(usize::MAX);
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .unwrap_or(&[])
    }

    /// Descriptors of the given data type.
    pub fn find_by_type(&self, data_type: DataType) -> impl Iterator<Item = &Descriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.data_type == data_type)
    }

    /// Partition descriptors with the given filesystem and partition types.
    pub fn find_partitions(
        &self,
        fs_type: FsType,
        part_type: PartType,
    ) -> impl Iterator<Item = &Descriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.is_partition(fs_type, part_type))
    }
}
