//! Data object descriptors.
//!
//! Every object stored in a SIF image (partitions, JSON blobs, signatures...)
//! is described by a fixed-size 585-byte descriptor in the descriptor table.
//! Partition descriptors carry their filesystem type, partition type and
//! architecture in the otherwise opaque `extra` area.

use std::fmt;

use crate::error::{SifError, SifResult};

/// Encoded size of a descriptor in bytes.
pub const DESCRIPTOR_LEN: usize = 585;

/// Size of the descriptor name field.
pub const DESCRIPTOR_NAME_LEN: usize = 128;

/// Size of the descriptor private `extra` area.
pub const DESCRIPTOR_EXTRA_LEN: usize = 384;

/// Mask applied to group IDs (`groupid = DESCRIPTOR_GROUP_MASK | n`).
pub const DESCRIPTOR_GROUP_MASK: u32 = 0xf000_0000;

/// Kind of data held by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Definition file used to build the image.
    Deffile,
    /// Environment variables.
    EnvVar,
    /// JSON labels.
    Labels,
    /// Filesystem partition.
    Partition,
    /// Signature block.
    Signature,
    /// Generic JSON blob.
    GenericJson,
    /// Generic opaque blob.
    Generic,
    /// Encrypted message.
    CryptoMessage,
    /// Data type unknown to this reader.
    Other(i32),
}

impl DataType {
    /// Numeric value as stored in the descriptor table.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Deffile => 0x4001,
            Self::EnvVar => 0x4002,
            Self::Labels => 0x4003,
            Self::Partition => 0x4004,
            Self::Signature => 0x4005,
            Self::GenericJson => 0x4006,
            Self::Generic => 0x4007,
            Self::CryptoMessage => 0x4008,
            Self::Other(code) => code,
        }
    }

    /// Map a stored numeric value back to a data type.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0x4001 => Self::Deffile,
            0x4002 => Self::EnvVar,
            0x4003 => Self::Labels,
            0x4004 => Self::Partition,
            0x4005 => Self::Signature,
            0x4006 => Self::GenericJson,
            0x4007 => Self::Generic,
            0x4008 => Self::CryptoMessage,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deffile => f.write_str("Def.FILE"),
            Self::EnvVar => f.write_str("Env.Vars"),
            Self::Labels => f.write_str("JSON.Labels"),
            Self::Partition => f.write_str("FS"),
            Self::Signature => f.write_str("Signature"),
            Self::GenericJson => f.write_str("JSON.Generic"),
            Self::Generic => f.write_str("Generic/Raw"),
            Self::CryptoMessage => f.write_str("Cryptographic Message"),
            Self::Other(code) => write!(f, "Unknown({code:#x})"),
        }
    }
}

/// Filesystem type of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsType {
    /// Squashfs.
    Squash,
    /// Ext3.
    Ext3,
    /// Immutable object archive.
    ImmutableObject,
    /// Raw bytes, no filesystem.
    Raw,
    /// Encrypted squashfs.
    EncryptedSquash,
    /// Filesystem type unknown to this reader.
    Other(i32),
}

impl FsType {
    /// Numeric value as stored in the descriptor extra area.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Squash => 1,
            Self::Ext3 => 2,
            Self::ImmutableObject => 3,
            Self::Raw => 4,
            Self::EncryptedSquash => 5,
            Self::Other(code) => code,
        }
    }

    /// Map a stored numeric value back to a filesystem type.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Squash,
            2 => Self::Ext3,
            3 => Self::ImmutableObject,
            4 => Self::Raw,
            5 => Self::EncryptedSquash,
            other => Self::Other(other),
        }
    }
}

/// Role of a partition inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    /// Container root filesystem.
    System,
    /// Primary root filesystem.
    PrimarySystem,
    /// Plain data.
    Data,
    /// Writable overlay.
    Overlay,
    /// Partition type unknown to this reader.
    Other(i32),
}

impl PartType {
    /// Numeric value as stored in the descriptor extra area.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::System => 1,
            Self::PrimarySystem => 2,
            Self::Data => 3,
            Self::Overlay => 4,
            Self::Other(code) => code,
        }
    }

    /// Map a stored numeric value back to a partition type.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::System,
            2 => Self::PrimarySystem,
            3 => Self::Data,
            4 => Self::Overlay,
            other => Self::Other(other),
        }
    }
}

/// Target architecture recorded in the header and in partition descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 32-bit x86.
    I386,
    /// x86-64.
    Amd64,
    /// 32-bit ARM.
    Arm,
    /// 64-bit ARM.
    Arm64,
    /// Big-endian POWER.
    Ppc64,
    /// Little-endian POWER.
    Ppc64le,
    /// 32-bit MIPS.
    Mips,
    /// 32-bit little-endian MIPS.
    Mipsle,
    /// 64-bit MIPS.
    Mips64,
    /// 64-bit little-endian MIPS.
    Mips64le,
    /// IBM Z.
    S390x,
    /// Unset or unrecognised architecture code.
    Unknown,
}

impl Arch {
    /// Two-character code stored in the image (NUL-terminated on disk).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Unknown => "00",
            Self::I386 => "01",
            Self::Amd64 => "02",
            Self::Arm => "03",
            Self::Arm64 => "04",
            Self::Ppc64 => "05",
            Self::Ppc64le => "06",
            Self::Mips => "07",
            Self::Mipsle => "08",
            Self::Mips64 => "09",
            Self::Mips64le => "10",
            Self::S390x => "11",
        }
    }

    /// Decode a stored architecture field.
    #[must_use]
    pub fn from_code(raw: &[u8]) -> Self {
        match trim_nul(raw) {
            b"01" => Self::I386,
            b"02" => Self::Amd64,
            b"03" => Self::Arm,
            b"04" => Self::Arm64,
            b"05" => Self::Ppc64,
            b"06" => Self::Ppc64le,
            b"07" => Self::Mips,
            b"08" => Self::Mipsle,
            b"09" => Self::Mips64,
            b"10" => Self::Mips64le,
            b"11" => Self::S390x,
            _ => Self::Unknown,
        }
    }

    /// Architecture of the running host.
    #[must_use]
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86" => Self::I386,
            "x86_64" => Self::Amd64,
            "arm" => Self::Arm,
            "aarch64" => Self::Arm64,
            "powerpc64" if cfg!(target_endian = "little") => Self::Ppc64le,
            "powerpc64" => Self::Ppc64,
            "mips" if cfg!(target_endian = "little") => Self::Mipsle,
            "mips" => Self::Mips,
            "mips64" if cfg!(target_endian = "little") => Self::Mips64le,
            "mips64" => Self::Mips64,
            "s390x" => Self::S390x,
            _ => Self::Unknown,
        }
    }

    pub(crate) fn encode(self) -> [u8; 3] {
        let code = self.code().as_bytes();
        [code[0], code[1], 0]
    }
}

/// Partition-specific fields stored in a partition descriptor's extra area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Filesystem type.
    pub fs_type: FsType,
    /// Partition role.
    pub part_type: PartType,
    /// Architecture the partition targets.
    pub arch: Arch,
}

impl PartitionInfo {
    fn decode(extra: &[u8]) -> SifResult<Self> {
        let mut r = ByteReader::new(extra, "partition info");
        let fs_type = FsType::from_code(r.i32()?);
        let part_type = PartType::from_code(r.i32()?);
        let arch = Arch::from_code(r.take(3)?);
        Ok(Self {
            fs_type,
            part_type,
            arch,
        })
    }

    pub(crate) fn encode(&self) -> [u8; DESCRIPTOR_EXTRA_LEN] {
        let mut extra = [0u8; DESCRIPTOR_EXTRA_LEN];
        extra[0..4].copy_from_slice(&self.fs_type.code().to_le_bytes());
        extra[4..8].copy_from_slice(&self.part_type.code().to_le_bytes());
        extra[8..11].copy_from_slice(&self.arch.encode());
        extra
    }
}

/// One entry of the descriptor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Kind of data the object holds.
    pub data_type: DataType,
    /// Unique descriptor ID (1-based).
    pub id: u32,
    /// Group ID, including [`DESCRIPTOR_GROUP_MASK`].
    pub group_id: u32,
    /// ID of a linked descriptor or group, 0 if unlinked.
    pub link: u32,
    /// Offset of the object data from the start of the image.
    pub offset: u64,
    /// Length of the object data.
    pub size: u64,
    /// Length of the object data including alignment padding.
    pub store_size: u64,
    /// Creation time (Unix seconds).
    pub ctime: i64,
    /// Modification time (Unix seconds).
    pub mtime: i64,
    /// Owner UID.
    pub uid: i64,
    /// Owner GID.
    pub gid: i64,
    /// Descriptive name (for example the original file name).
    pub name: String,
    /// Partition fields, present only for [`DataType::Partition`].
    pub partition: Option<PartitionInfo>,
}

impl Descriptor {
    /// Decode one table slot. Returns `None` for unused slots.
    pub(crate) fn decode(slot: &[u8]) -> SifResult<Option<Self>> {
        let mut r = ByteReader::new(slot, "descriptor");
        let data_type = DataType::from_code(r.i32()?);
        let used = r.u8()? != 0;
        let id = r.u32()?;
        let group_id = r.u32()?;
        let link = r.u32()?;
        let raw_offset = r.i64()?;
        let raw_size = r.i64()?;
        let raw_store_size = r.i64()?;
        let ctime = r.i64()?;
        let mtime = r.i64()?;
        let uid = r.i64()?;
        let gid = r.i64()?;
        let name = decode_str(r.take(DESCRIPTOR_NAME_LEN)?);
        let extra = r.take(DESCRIPTOR_EXTRA_LEN)?;

        if !used {
            return Ok(None);
        }

        let offset = non_negative("descriptor offset", raw_offset)?;
        let size = non_negative("descriptor size", raw_size)?;
        let store_size = non_negative("descriptor store size", raw_store_size)?;
        let partition = if data_type == DataType::Partition {
            Some(PartitionInfo::decode(extra)?)
        } else {
            None
        };

        Ok(Some(Self {
            data_type,
            id,
            group_id,
            link,
            offset,
            size,
            store_size,
            ctime,
            mtime,
            uid,
            gid,
            name,
            partition,
        }))
    }

    /// Encode into a table slot (always marked used).
    pub(crate) fn encode(&self) -> SifResult<Vec<u8>> {
        let mut out = Vec::with_capacity(DESCRIPTOR_LEN);
        out.extend_from_slice(&self.data_type.code().to_le_bytes());
        out.push(1);
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.group_id.to_le_bytes());
        out.extend_from_slice(&self.link.to_le_bytes());
        out.extend_from_slice(&to_i64("descriptor offset", self.offset)?.to_le_bytes());
        out.extend_from_slice(&to_i64("descriptor size", self.size)?.to_le_bytes());
        out.extend_from_slice(&to_i64("descriptor store size", self.store_size)?.to_le_bytes());
        out.extend_from_slice(&self.ctime.to_le_bytes());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.extend_from_slice(&self.uid.to_le_bytes());
        out.extend_from_slice(&self.gid.to_le_bytes());
        out.extend_from_slice(&encode_str::<DESCRIPTOR_NAME_LEN>(&self.name));
        match &self.partition {
            Some(info) => out.extend_from_slice(&info.encode()),
            None => out.extend_from_slice(&[0u8; DESCRIPTOR_EXTRA_LEN]),
        }
        Ok(out)
    }

    /// Whether this descriptor is a partition of the given types.
    #[must_use]
    pub fn is_partition(&self, fs_type: FsType, part_type: PartType) -> bool {
        self.partition
            .is_some_and(|p| p.fs_type == fs_type && p.part_type == part_type)
    }
}

/// Little-endian cursor over a bounds-checked byte slice.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, pos: 0, what }
    }

    pub(crate) fn take(&mut self, n: usize) -> SifResult<&'a [u8]> {
        let chunk = self
            .pos
            .checked_add(n)
            .and_then(|end| self.buf.get(self.pos..end))
            .ok_or(SifError::Truncated {
                what: self.what,
                needed: u64::try_from(self.pos.saturating_add(n)).unwrap_or(u64::MAX),
                available: u64::try_from(self.buf.len()).unwrap_or(u64::MAX),
            })?;
        self.pos = self.pos.saturating_add(n);
        Ok(chunk)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> SifResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> SifResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn i32(&mut self) -> SifResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> SifResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i64(&mut self) -> SifResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}

pub(crate) fn non_negative(field: &'static str, value: i64) -> SifResult<u64> {
    u64::try_from(value).map_err(|_| SifError::InvalidField { field, value })
}

pub(crate) fn to_i64(field: &'static str, value: u64) -> SifResult<i64> {
    i64::try_from(value).map_err(|_| SifError::InvalidField {
        field,
        value: i64::MAX,
    })
}

pub(crate) fn trim_nul(raw: &[u8]) -> &[u8] {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    &raw[..end]
}

pub(crate) fn decode_str(raw: &[u8]) -> String {
    String::from_utf8_lossy(trim_nul(raw)).into_owned()
}

/// Encode a string into a fixed NUL-padded field, truncating so that at
/// least one terminating NUL remains.
pub(crate) fn encode_str<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N.saturating_sub(1));
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Descriptor {
        Descriptor {
            data_type: DataType::Partition,
            id: 1,
            group_id: DESCRIPTOR_GROUP_MASK | 1,
            link: 0,
            offset: 4096,
            size: 12,
            store_size: 12,
            ctime: 1_700_000_000,
            mtime: 1_700_000_000,
            uid: 0,
            gid: 0,
            name: "object.so".into(),
            partition: Some(PartitionInfo {
                fs_type: FsType::Raw,
                part_type: PartType::Data,
                arch: Arch::Amd64,
            }),
        }
    }

    #[test]
    fn encoded_descriptor_has_fixed_length() {
        let encoded = sample().encode().unwrap();
        assert_eq!(encoded.len(), DESCRIPTOR_LEN);
    }

    #[test]
    fn decode_reads_back_partition_fields() {
        let encoded = sample().encode().unwrap();
        let decoded = Descriptor::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, sample());
        assert!(decoded.is_partition(FsType::Raw, PartType::Data));
        assert!(!decoded.is_partition(FsType::Squash, PartType::Data));
    }

    #[test]
    fn unused_slot_decodes_to_none() {
        let mut encoded = sample().encode().unwrap();
        encoded[4] = 0;
        assert!(Descriptor::decode(&encoded).unwrap().is_none());
    }

    #[test]
    fn negative_offset_is_rejected() {
        let mut encoded = sample().encode().unwrap();
        // fileoff starts after datatype(4) + used(1) + id/groupid/link(12)
        encoded[17..25].copy_from_slice(&(-1i64).to_le_bytes());
        let err = Descriptor::decode(&encoded).unwrap_err();
        assert!(matches!(err, SifError::InvalidField { field: "descriptor offset", .. }));
    }

    #[test]
    fn short_slot_is_truncated_error() {
        let encoded = sample().encode().unwrap();
        let err = Descriptor::decode(&encoded[..100]).unwrap_err();
        assert!(matches!(err, SifError::Truncated { what: "descriptor", .. }));
    }

    #[test]
    fn unknown_codes_are_preserved() {
        assert_eq!(DataType::from_code(0x5000), DataType::Other(0x5000));
        assert_eq!(DataType::Other(0x5000).code(), 0x5000);
        assert_eq!(FsType::from_code(42).code(), 42);
        assert_eq!(PartType::from_code(-3), PartType::Other(-3));
    }

    #[test]
    fn long_names_keep_a_terminator() {
        let long = "x".repeat(300);
        let field = encode_str::<DESCRIPTOR_NAME_LEN>(&long);
        assert_eq!(field[DESCRIPTOR_NAME_LEN - 1], 0);
        assert_eq!(decode_str(&field).len(), DESCRIPTOR_NAME_LEN - 1);
    }

    #[test]
    fn arch_codes_round_trip() {
        for arch in [Arch::Amd64, Arch::Arm64, Arch::S390x, Arch::Ppc64le] {
            assert_eq!(Arch::from_code(&arch.encode()), arch);
        }
        assert_eq!(Arch::from_code(b"zz\0"), Arch::Unknown);
    }
}
