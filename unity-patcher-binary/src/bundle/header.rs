//! UnityFS bundle header

use crate::compression::{ArchiveFlags, CompressionType};
use crate::error::{BinaryError, Result};
use crate::reader::BinaryReader;
use crate::writer::BinaryWriter;

pub const UNITY_FS: &str = "UnityFS";

/// UnityFS header (big-endian)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleHeader {
    pub signature: String,
    /// Bundle format version
    pub version: u32,
    /// Unity version that created this bundle
    pub unity_version: String,
    pub unity_revision: String,
    /// Total bundle size
    pub size: u64,
    pub compressed_blocks_info_size: u32,
    pub uncompressed_blocks_info_size: u32,
    /// Archive flags (compression type, block info location, etc.)
    pub flags: u32,
}

impl BundleHeader {
    pub fn from_reader(reader: &mut BinaryReader) -> Result<Self> {
        let signature = reader.read_cstring()?;
        if signature != UNITY_FS {
            return Err(match signature.as_str() {
                "UnityWeb" | "UnityRaw" | "UnityArchive" => BinaryError::unsupported(format!(
                    "{} bundles are not supported",
                    signature
                )),
                _ => BinaryError::invalid_signature(UNITY_FS.to_string(), signature),
            });
        }

        Ok(Self {
            signature,
            version: reader.read_u32()?,
            unity_version: reader.read_cstring()?,
            unity_revision: reader.read_cstring()?,
            size: reader.read_i64()? as u64,
            compressed_blocks_info_size: reader.read_u32()?,
            uncompressed_blocks_info_size: reader.read_u32()?,
            flags: reader.read_u32()?,
        })
    }

    /// Whether `data` starts with the UnityFS signature
    pub fn is_bundle(data: &[u8]) -> bool {
        data.starts_with(b"UnityFS\0")
    }

    pub fn compression(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.flags)
    }

    pub fn block_info_at_end(&self) -> bool {
        self.flags & ArchiveFlags::BLOCK_INFO_AT_END != 0
    }

    /// Byte length of the header fields, before any alignment
    pub fn encoded_len(&self) -> usize {
        self.signature.len()
            + 1
            + 4
            + self.unity_version.len()
            + 1
            + self.unity_revision.len()
            + 1
            + 8
            + 4
            + 4
            + 4
    }

    /// Writer must be big-endian
    pub fn write(&self, writer: &mut BinaryWriter) {
        writer.write_cstring(&self.signature);
        writer.write_u32(self.version);
        writer.write_cstring(&self.unity_version);
        writer.write_cstring(&self.unity_revision);
        writer.write_i64(self.size as i64);
        writer.write_u32(self.compressed_blocks_info_size);
        writer.write_u32(self.uncompressed_blocks_info_size);
        writer.write_u32(self.flags);
    }
}
