//! Unity TypeTree processing module
//!
//! - `types` - the nested [`TypeTreeNode`]
//! - `parser` - typetree parsing from serialized file metadata
//! - `serializer` - object bytes to [`UnityValue`](unity_patcher_core::UnityValue) and back
//!
//! # Examples
//!
//! ```rust,no_run
//! use unity_patcher_binary::typetree::{TypeTreeParser, TypeTreeSerializer};
//! use unity_patcher_binary::reader::{BinaryReader, ByteOrder};
//!
//! # let (metadata, object) = (Vec::<u8>::new(), Vec::<u8>::new());
//! let mut reader = BinaryReader::new(&metadata, ByteOrder::Little);
//! let tree = TypeTreeParser::from_reader(&mut reader, 22)?;
//!
//! let mut object_reader = BinaryReader::new(&object, ByteOrder::Little);
//! let fields = TypeTreeSerializer::new(&tree).read_object(&mut object_reader)?;
//! # Ok::<(), unity_patcher_binary::error::BinaryError>(())
//! ```

pub mod common_strings;
pub mod parser;
pub mod serializer;
pub mod types;

pub use parser::{TypeTreeBlobWriter, TypeTreeParser};
pub use serializer::TypeTreeSerializer;
pub use types::{ALIGN_FLAG, TypeTreeNode};

use crate::error::Result;
use crate::reader::{BinaryReader, ByteOrder};
use crate::writer::BinaryWriter;
use unity_patcher_core::UnityValue;

/// Decode object bytes with the given layout
pub fn read_typetree(data: &[u8], tree: &TypeTreeNode, byte_order: ByteOrder) -> Result<UnityValue> {
    let mut reader = BinaryReader::new(data, byte_order);
    TypeTreeSerializer::new(tree).read_object(&mut reader)
}

/// Encode a field tree with the given layout
pub fn write_typetree(
    value: &UnityValue,
    tree: &TypeTreeNode,
    byte_order: ByteOrder,
) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::new(byte_order);
    TypeTreeSerializer::new(tree).write_object(value, &mut writer)?;
    Ok(writer.into_inner())
}
