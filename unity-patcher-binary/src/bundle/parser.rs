//! UnityFS parser
//!
//! Decompresses the block table, then the data blocks, and splits the
//! resulting stream into directory entries. Serialized entries are parsed
//! right away; everything else is kept as a resource blob.

use super::header::BundleHeader;
use super::types::{BundleEntry, DirectoryNode, EntryContent, NODE_SERIALIZED_FILE};
use super::BundleFile;
use crate::compression::{self, ArchiveFlags, CompressionBlock, CompressionType};
use crate::error::{BinaryError, Result};
use crate::reader::{BinaryReader, ByteOrder};
use crate::resource::ResourceFile;
use crate::serialized_file::{SerializedFile, SerializedFileHeader};
use std::sync::Arc;

pub struct BundleParser;

impl BundleParser {
    pub fn parse(name: &str, data: &[u8]) -> Result<BundleFile> {
        let mut reader = BinaryReader::new(data, ByteOrder::Big);
        let header = BundleHeader::from_reader(&mut reader)?;
        if header.version >= 7 {
            reader.align_to(16)?;
        }

        let info_size = header.compressed_blocks_info_size as usize;
        let info_bytes = if header.block_info_at_end() {
            let start = data
                .len()
                .checked_sub(info_size)
                .ok_or_else(|| BinaryError::not_enough_data(info_size, data.len()))?;
            &data[start..]
        } else {
            reader.take(info_size)?
        };
        let info = compression::decompress(
            info_bytes,
            header.compression()?,
            header.uncompressed_blocks_info_size as usize,
        )?;
        let (blocks, nodes) = Self::read_blocks_info(&info)?;

        if header.flags & ArchiveFlags::BLOCK_INFO_NEEDS_PADDING_AT_START != 0 {
            reader.align_to(16)?;
        }

        let total: usize = blocks.iter().map(|b| b.uncompressed_size as usize).sum();
        let mut stream = Vec::with_capacity(total);
        for block in &blocks {
            let raw = reader.take(block.compressed_size as usize)?;
            stream.extend_from_slice(&block.decompress(raw)?);
        }

        let block_compression = blocks
            .first()
            .map(|b| b.compression_type())
            .transpose()?
            .unwrap_or(CompressionType::None);

        let mut entries = Vec::with_capacity(nodes.len());
        for node in nodes {
            let start = node.offset as usize;
            let end = start + node.size as usize;
            let bytes = stream
                .get(start..end)
                .ok_or_else(|| BinaryError::not_enough_data(end, stream.len()))?;
            let content = Self::decode_entry(name, &node, bytes);
            entries.push(BundleEntry { node, content });
        }

        Ok(BundleFile::new(name, header, block_compression, entries))
    }

    /// Entry paths from the directory alone, without touching data blocks
    pub fn entry_names(data: &[u8]) -> Result<Vec<String>> {
        let mut reader = BinaryReader::new(data, ByteOrder::Big);
        let header = BundleHeader::from_reader(&mut reader)?;
        if header.version >= 7 {
            reader.align_to(16)?;
        }
        let info_size = header.compressed_blocks_info_size as usize;
        let info_bytes = if header.block_info_at_end() {
            let start = data
                .len()
                .checked_sub(info_size)
                .ok_or_else(|| BinaryError::not_enough_data(info_size, data.len()))?;
            &data[start..]
        } else {
            reader.take(info_size)?
        };
        let info = compression::decompress(
            info_bytes,
            header.compression()?,
            header.uncompressed_blocks_info_size as usize,
        )?;
        let (_, nodes) = Self::read_blocks_info(&info)?;
        Ok(nodes.into_iter().map(|node| node.path).collect())
    }

    fn read_blocks_info(info: &[u8]) -> Result<(Vec<CompressionBlock>, Vec<DirectoryNode>)> {
        let mut reader = BinaryReader::new(info, ByteOrder::Big);
        reader.take(16)?; // uncompressed data hash

        let block_count = reader.read_i32()?.max(0);
        let mut blocks = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            blocks.push(CompressionBlock::new(
                reader.read_u32()?,
                reader.read_u32()?,
                reader.read_u16()?,
            ));
        }

        let node_count = reader.read_i32()?.max(0);
        let mut nodes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            nodes.push(DirectoryNode::from_reader(&mut reader)?);
        }
        Ok((blocks, nodes))
    }

    fn decode_entry(bundle_name: &str, node: &DirectoryNode, bytes: &[u8]) -> EntryContent {
        if SerializedFileHeader::looks_valid(bytes) {
            match SerializedFile::from_bytes(&node.path, bytes) {
                Ok(file) => return EntryContent::Serialized(Arc::new(file.with_parent(bundle_name))),
                Err(e) if node.flags & NODE_SERIALIZED_FILE != 0 => {
                    tracing::warn!("{} in {} kept as raw data: {}", node.path, bundle_name, e)
                }
                Err(e) => tracing::debug!("{} in {} is not a serialized file: {}", node.path, bundle_name, e),
            }
        }
        EntryContent::Resource(Arc::new(ResourceFile::new(&node.path, bytes.to_vec())))
    }
}
