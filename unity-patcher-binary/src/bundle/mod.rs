//! UnityFS asset bundles
//!
//! # Example
//!
//! ```rust,no_run
//! use unity_patcher_binary::bundle::{BundleFile, Packer};
//!
//! let data = std::fs::read("data.unity3d")?;
//! let bundle = BundleFile::from_bytes("data.unity3d", &data)?;
//! for file in bundle.serialized_files() {
//!     println!("{}: {} objects", file.name(), file.object_count());
//! }
//! let repacked = bundle.to_bytes(Packer::Lz4)?;
//! # Ok::<(), unity_patcher_binary::error::BinaryError>(())
//! ```

pub mod header;
pub mod parser;
pub mod types;
mod writer;

pub use header::BundleHeader;
pub use parser::BundleParser;
pub use types::{BundleEntry, DirectoryNode, EntryContent};

use crate::compression::CompressionType;
use crate::error::{BinaryError, Result};
use crate::resource::ResourceFile;
use crate::serialized_file::SerializedFile;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Block compression used when saving a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Packer {
    None,
    /// Reuse the compression the bundle was loaded with
    #[default]
    Original,
    Lz4,
    Lzma,
}

impl FromStr for Packer {
    type Err = BinaryError;

    fn from_str(text: &str) -> Result<Self> {
        match text.to_ascii_lowercase().as_str() {
            "none" => Ok(Packer::None),
            "original" => Ok(Packer::Original),
            "lz4" => Ok(Packer::Lz4),
            "lzma" => Ok(Packer::Lzma),
            other => Err(BinaryError::unsupported_compression(format!(
                "Unknown packer '{}' (expected none, original, lz4 or lzma)",
                other
            ))),
        }
    }
}

/// A loaded UnityFS bundle
#[derive(Debug)]
pub struct BundleFile {
    name: String,
    pub header: BundleHeader,
    block_compression: CompressionType,
    entries: Vec<BundleEntry>,
    changed: AtomicBool,
}

impl BundleFile {
    pub fn from_bytes(name: &str, data: &[u8]) -> Result<Self> {
        BundleParser::parse(name, data)
    }

    /// Assemble a bundle from already decoded entries
    pub fn new(
        name: &str,
        header: BundleHeader,
        block_compression: CompressionType,
        entries: Vec<BundleEntry>,
    ) -> Self {
        Self {
            name: name.to_string(),
            header,
            block_compression,
            entries,
            changed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compression of the first data block as loaded
    pub fn block_compression(&self) -> CompressionType {
        self.block_compression
    }

    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    /// Case-insensitive lookup by entry path
    pub fn find_entry(&self, path: &str) -> Option<&BundleEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name().eq_ignore_ascii_case(path))
    }

    pub fn serialized_files(&self) -> impl Iterator<Item = &Arc<SerializedFile>> {
        self.entries.iter().filter_map(|entry| match &entry.content {
            EntryContent::Serialized(file) => Some(file),
            EntryContent::Resource(_) => None,
        })
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<ResourceFile>> {
        self.entries.iter().filter_map(|entry| match &entry.content {
            EntryContent::Resource(blob) => Some(blob),
            EntryContent::Serialized(_) => None,
        })
    }

    /// Changed when flagged directly or when any entry changed
    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire) || self.entries.iter().any(BundleEntry::is_changed)
    }

    pub fn mark_changed(&self) {
        self.changed.store(true, Ordering::Release);
    }

    /// Serialize with the chosen block compression
    pub fn to_bytes(&self, packer: Packer) -> Result<Vec<u8>> {
        writer::write(self, packer)
    }
}
