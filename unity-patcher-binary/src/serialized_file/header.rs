//! SerializedFile header
//!
//! The header is always big-endian. Format 22 moved sizes and offsets to
//! 64-bit fields that follow the legacy (zeroed) ones.

use crate::error::{BinaryError, Result};
use crate::reader::{BinaryReader, ByteOrder};
use crate::writer::BinaryWriter;

/// Oldest format this crate reads and writes
pub const MIN_SUPPORTED_FORMAT: u32 = 9;

/// Header of a Unity SerializedFile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedFileHeader {
    /// Size of the metadata section that follows the header
    pub metadata_size: u32,
    /// Total file size
    pub file_size: u64,
    /// File format version
    pub version: u32,
    /// Offset to the data section
    pub data_offset: u64,
    /// Endianness (0 = little, 1 = big)
    pub endian: u8,
    /// Reserved bytes
    pub reserved: [u8; 3],
}

impl SerializedFileHeader {
    /// Parse header from the start of the file
    pub fn from_reader(reader: &mut BinaryReader) -> Result<Self> {
        let mut metadata_size = reader.read_u32()?;
        let mut file_size = reader.read_u32()? as u64;
        let version = reader.read_u32()?;
        let mut data_offset = reader.read_u32()? as u64;

        if !(1..100).contains(&version) {
            return Err(BinaryError::invalid_format(format!(
                "Not a serialized file (format {})",
                version
            )));
        }
        if version < MIN_SUPPORTED_FORMAT {
            return Err(BinaryError::unsupported_version(format!(
                "Serialized file format {} is older than {}",
                version, MIN_SUPPORTED_FORMAT
            )));
        }

        let endian = reader.read_u8()?;
        let mut reserved = [0u8; 3];
        reserved.copy_from_slice(reader.take(3)?);

        if version >= 22 {
            metadata_size = reader.read_u32()?;
            file_size = reader.read_i64()? as u64;
            data_offset = reader.read_i64()? as u64;
            reader.read_i64()?;
        }

        Ok(Self {
            metadata_size,
            file_size,
            version,
            data_offset,
            endian,
            reserved,
        })
    }

    /// Cheap check used to tell serialized files apart from resource blobs
    pub fn looks_valid(data: &[u8]) -> bool {
        let mut reader = BinaryReader::new(data, ByteOrder::Big);
        match Self::from_reader(&mut reader) {
            Ok(header) => {
                header.file_size == data.len() as u64
                    && header.data_offset <= header.file_size
                    && header.endian <= 1
            }
            Err(_) => false,
        }
    }

    /// Size of the header on disk
    pub fn size(&self) -> usize {
        if self.version >= 22 { 48 } else { 20 }
    }

    /// Get the byte order from the endian flag
    pub fn byte_order(&self) -> ByteOrder {
        if self.endian == 0 {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    /// Write the header in big-endian order
    pub fn write(&self, writer: &mut BinaryWriter) {
        let previous = writer.byte_order();
        writer.set_byte_order(ByteOrder::Big);
        if self.version >= 22 {
            writer.write_u32(0);
            writer.write_u32(0);
            writer.write_u32(self.version);
            writer.write_u32(0);
            writer.write_u8(self.endian);
            writer.write_bytes(&self.reserved);
            writer.write_u32(self.metadata_size);
            writer.write_i64(self.file_size as i64);
            writer.write_i64(self.data_offset as i64);
            writer.write_i64(0);
        } else {
            writer.write_u32(self.metadata_size);
            writer.write_u32(self.file_size as u32);
            writer.write_u32(self.version);
            writer.write_u32(self.data_offset as u32);
            writer.write_u8(self.endian);
            writer.write_bytes(&self.reserved);
        }
        writer.set_byte_order(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u32) -> SerializedFileHeader {
        SerializedFileHeader {
            metadata_size: 100,
            file_size: 4200,
            version,
            data_offset: 4096,
            endian: 0,
            reserved: [0; 3],
        }
    }

    #[test]
    fn test_header_sizes_by_format() {
        for version in [17u32, 22] {
            let mut writer = BinaryWriter::new(ByteOrder::Little);
            header(version).write(&mut writer);
            let bytes = writer.into_inner();
            assert_eq!(bytes.len(), header(version).size());

            let mut reader = BinaryReader::new(&bytes, ByteOrder::Big);
            assert_eq!(SerializedFileHeader::from_reader(&mut reader).unwrap(), header(version));
        }
    }

    #[test]
    fn test_old_formats_rejected() {
        let mut writer = BinaryWriter::new(ByteOrder::Big);
        for value in [10u32, 200, 8, 100] {
            writer.write_u32(value);
        }
        writer.write_bytes(&[0; 4]);
        let bytes = writer.into_inner();
        let mut reader = BinaryReader::new(&bytes, ByteOrder::Big);
        assert!(matches!(
            SerializedFileHeader::from_reader(&mut reader),
            Err(BinaryError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_resource_blob_not_detected() {
        assert!(!SerializedFileHeader::looks_valid(b"OggS\0\0\0\0some audio data here"));
    }
}
