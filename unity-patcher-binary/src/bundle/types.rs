//! Bundle directory records

use crate::error::Result;
use crate::reader::BinaryReader;
use crate::resource::ResourceFile;
use crate::serialized_file::SerializedFile;
use crate::writer::BinaryWriter;
use std::sync::Arc;

/// Directory flag marking a serialized file entry
pub const NODE_SERIALIZED_FILE: u32 = 0x4;

/// One file in the bundle's directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryNode {
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
    pub path: String,
}

impl DirectoryNode {
    pub fn from_reader(reader: &mut BinaryReader) -> Result<Self> {
        Ok(Self {
            offset: reader.read_i64()? as u64,
            size: reader.read_i64()? as u64,
            flags: reader.read_u32()?,
            path: reader.read_cstring()?,
        })
    }

    pub fn write(&self, writer: &mut BinaryWriter) {
        writer.write_i64(self.offset as i64);
        writer.write_i64(self.size as i64);
        writer.write_u32(self.flags);
        writer.write_cstring(&self.path);
    }
}

/// Decoded content of a directory entry
#[derive(Debug, Clone)]
pub enum EntryContent {
    Serialized(Arc<SerializedFile>),
    Resource(Arc<ResourceFile>),
}

/// A bundle entry with its decoded content
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub node: DirectoryNode,
    pub content: EntryContent,
}

impl BundleEntry {
    pub fn name(&self) -> &str {
        &self.node.path
    }

    pub fn is_changed(&self) -> bool {
        match &self.content {
            EntryContent::Serialized(file) => file.is_changed(),
            EntryContent::Resource(blob) => blob.is_changed(),
        }
    }

    /// Current bytes of the entry
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match &self.content {
            EntryContent::Serialized(file) => file.to_bytes(),
            EntryContent::Resource(blob) => Ok(blob.bytes()),
        }
    }
}
