//! UnityFS writer
//!
//! Entries are concatenated in directory order and cut into 128 KiB blocks
//! (one block for LZMA). The block table follows the header directly.

use super::header::BundleHeader;
use super::types::DirectoryNode;
use super::{BundleFile, Packer};
use crate::compression::{self, ArchiveFlags, CompressionBlock, CompressionType};
use crate::error::Result;
use crate::reader::ByteOrder;
use crate::writer::BinaryWriter;

const BLOCK_SIZE: usize = 0x20000;

pub(crate) fn write(bundle: &BundleFile, packer: Packer) -> Result<Vec<u8>> {
    let compression = match packer {
        Packer::None => CompressionType::None,
        Packer::Lz4 => CompressionType::Lz4Hc,
        Packer::Lzma => CompressionType::Lzma,
        Packer::Original => match bundle.block_compression() {
            CompressionType::Lzham => CompressionType::Lz4Hc,
            other => other,
        },
    };

    let mut stream = Vec::new();
    let mut nodes = Vec::with_capacity(bundle.entries().len());
    for entry in bundle.entries() {
        let bytes = entry.to_bytes()?;
        nodes.push(DirectoryNode {
            offset: stream.len() as u64,
            size: bytes.len() as u64,
            ..entry.node.clone()
        });
        stream.extend_from_slice(&bytes);
    }

    let chunk_size = if compression == CompressionType::Lzma {
        stream.len().max(1)
    } else {
        BLOCK_SIZE
    };
    let mut blocks = Vec::new();
    let mut block_data = Vec::new();
    for chunk in stream.chunks(chunk_size) {
        let packed = compression::compress(chunk, compression)?;
        blocks.push(CompressionBlock::new(
            chunk.len() as u32,
            packed.len() as u32,
            compression as u16,
        ));
        block_data.extend_from_slice(&packed);
    }

    let mut info = BinaryWriter::new(ByteOrder::Big);
    info.write_bytes(&[0u8; 16]);
    info.write_i32(blocks.len() as i32);
    for block in &blocks {
        info.write_u32(block.uncompressed_size);
        info.write_u32(block.compressed_size);
        info.write_u16(block.flags);
    }
    info.write_i32(nodes.len() as i32);
    for node in &nodes {
        node.write(&mut info);
    }
    let info = info.into_inner();
    let packed_info = compression::compress(&info, compression)?;

    let mut header = BundleHeader {
        compressed_blocks_info_size: packed_info.len() as u32,
        uncompressed_blocks_info_size: info.len() as u32,
        flags: compression as u32 | ArchiveFlags::BLOCKS_AND_DIRECTORY_COMBINED,
        ..bundle.header.clone()
    };
    let mut header_len = header.encoded_len();
    if header.version >= 7 {
        header_len = header_len.div_ceil(16) * 16;
    }
    header.size = (header_len + packed_info.len() + block_data.len()) as u64;

    let mut out = BinaryWriter::new(ByteOrder::Big);
    header.write(&mut out);
    out.pad_to(header_len);
    out.write_bytes(&packed_info);
    out.write_bytes(&block_data);
    Ok(out.into_inner())
}
