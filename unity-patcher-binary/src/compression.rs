//! Block compression used by UnityFS bundles

use crate::error::{BinaryError, Result};
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};

/// Compression types stored in the low bits of bundle and block flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression
    None = 0,
    /// LZMA compression
    Lzma = 1,
    /// LZ4 compression
    Lz4 = 2,
    /// LZ4HC (High Compression) compression
    Lz4Hc = 3,
    /// LZHAM compression
    Lzham = 4,
}

impl CompressionType {
    /// Create compression type from the low six flag bits
    pub fn from_flags(flags: u32) -> Result<Self> {
        match flags & ArchiveFlags::COMPRESSION_TYPE_MASK {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lzma),
            2 => Ok(CompressionType::Lz4),
            3 => Ok(CompressionType::Lz4Hc),
            4 => Ok(CompressionType::Lzham),
            other => Err(BinaryError::unsupported_compression(format!(
                "Unknown compression type: {}",
                other
            ))),
        }
    }

    /// Get the name of the compression type
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::None => "None",
            CompressionType::Lzma => "LZMA",
            CompressionType::Lz4 => "LZ4",
            CompressionType::Lz4Hc => "LZ4HC",
            CompressionType::Lzham => "LZHAM",
        }
    }
}

/// Decompress one block
pub fn decompress(
    data: &[u8],
    compression: CompressionType,
    uncompressed_size: usize,
) -> Result<Vec<u8>> {
    let output = match compression {
        CompressionType::None => data.to_vec(),
        CompressionType::Lz4 | CompressionType::Lz4Hc => {
            lz4_flex::block::decompress(data, uncompressed_size)?
        }
        CompressionType::Lzma => decompress_lzma(data, uncompressed_size)?,
        CompressionType::Lzham => {
            return Err(BinaryError::unsupported_compression(
                "LZHAM compression is not supported",
            ));
        }
    };

    if output.len() != uncompressed_size {
        return Err(BinaryError::decompression_failed(format!(
            "{} block size mismatch: expected {}, got {}",
            compression.name(),
            uncompressed_size,
            output.len()
        )));
    }
    Ok(output)
}

/// Compress one block
pub fn compress(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4 | CompressionType::Lz4Hc => Ok(lz4_flex::block::compress(data)),
        CompressionType::Lzma => compress_lzma(data),
        CompressionType::Lzham => Err(BinaryError::unsupported_compression(
            "LZHAM compression is not supported",
        )),
    }
}

/// Unity stores LZMA as a 5-byte properties header followed by the raw
/// stream; the unpacked size comes from the block table instead.
fn decompress_lzma(data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    if data.len() < 5 {
        return Err(BinaryError::not_enough_data(5, data.len()));
    }
    let options = lzma_rs::decompress::Options {
        unpacked_size: lzma_rs::decompress::UnpackedSize::UseProvided(Some(
            uncompressed_size as u64,
        )),
        ..Default::default()
    };
    let mut output = Vec::with_capacity(uncompressed_size);
    lzma_rs::lzma_decompress_with_options(&mut Cursor::new(data), &mut output, &options)?;
    Ok(output)
}

fn compress_lzma(data: &[u8]) -> Result<Vec<u8>> {
    let options = lzma_rs::compress::Options {
        unpacked_size: lzma_rs::compress::UnpackedSize::SkipWritingToHeader,
    };
    let mut output = Vec::new();
    lzma_rs::lzma_compress_with_options(&mut Cursor::new(data), &mut output, &options)
        .map_err(|e| BinaryError::compression_failed(format!("LZMA: {}", e)))?;
    Ok(output)
}

/// Decompress Brotli data (WebGL builds ship `.br` files)
pub fn decompress_brotli(data: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    brotli::Decompressor::new(data, 4096)
        .read_to_end(&mut decompressed)
        .map_err(|e| {
            BinaryError::decompression_failed(format!("Brotli decompression failed: {}", e))
        })?;
    Ok(decompressed)
}

/// Decompress GZIP data (WebGL builds ship `.gz` files)
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut decompressed)
        .map_err(|e| {
            BinaryError::decompression_failed(format!("GZIP decompression failed: {}", e))
        })?;
    Ok(decompressed)
}

/// Strip a WebGL transport compression layer based on the file extension
pub fn unwrap_transport(file_name: &str, data: Vec<u8>) -> Result<Vec<u8>> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".br") {
        decompress_brotli(&data)
    } else if lower.ends_with(".gz") || data.starts_with(&[0x1f, 0x8b]) {
        decompress_gzip(&data)
    } else {
        Ok(data)
    }
}

/// Compression block information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionBlock {
    /// Uncompressed size of the block
    pub uncompressed_size: u32,
    /// Compressed size of the block
    pub compressed_size: u32,
    /// Compression flags
    pub flags: u16,
}

impl CompressionBlock {
    /// Create a new compression block
    pub fn new(uncompressed_size: u32, compressed_size: u32, flags: u16) -> Self {
        Self {
            uncompressed_size,
            compressed_size,
            flags,
        }
    }

    /// Get the compression type for this block
    pub fn compression_type(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.flags as u32)
    }

    /// Decompress the block data
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() != self.compressed_size as usize {
            return Err(BinaryError::invalid_data(format!(
                "Block data size mismatch: expected {}, got {}",
                self.compressed_size,
                data.len()
            )));
        }
        decompress(data, self.compression_type()?, self.uncompressed_size as usize)
    }
}

/// Archive flags used in UnityFS headers
pub struct ArchiveFlags;

impl ArchiveFlags {
    /// Compression type mask
    pub const COMPRESSION_TYPE_MASK: u32 = 0x3F;
    /// Block table and directory stored together
    pub const BLOCKS_AND_DIRECTORY_COMBINED: u32 = 0x40;
    /// Block info at end of file
    pub const BLOCK_INFO_AT_END: u32 = 0x80;
    /// Old web plugin compatibility
    pub const OLD_WEB_PLUGIN_COMPATIBILITY: u32 = 0x100;
    /// Data section starts on a 16-byte boundary
    pub const BLOCK_INFO_NEEDS_PADDING_AT_START: u32 = 0x200;
}
