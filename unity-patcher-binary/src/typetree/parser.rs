//! TypeTree parser
//!
//! Serialized files store typetrees in one of two layouts: the blob
//! layout (format 10 and 12+) with a shared string buffer, and the older
//! recursive layout with inline strings.

use super::common_strings::common_string;
use super::types::TypeTreeNode;
use crate::error::{BinaryError, Result};
use crate::reader::BinaryReader;
use crate::writer::BinaryWriter;
use std::collections::HashMap;

/// TypeTree parser
pub struct TypeTreeParser;

impl TypeTreeParser {
    /// Parse a typetree in the layout used by serialized file `format`
    pub fn from_reader(reader: &mut BinaryReader, format: u32) -> Result<TypeTreeNode> {
        if format >= 12 || format == 10 {
            Self::from_reader_blob(reader, format)
        } else {
            let mut flat = Vec::new();
            Self::read_legacy_node(reader, format, 0, &mut flat)?;
            TypeTreeNode::from_flat(flat)
        }
    }

    /// Parse the blob layout
    pub fn from_reader_blob(reader: &mut BinaryReader, format: u32) -> Result<TypeTreeNode> {
        let node_count = reader.read_i32()?;
        let string_buffer_size = reader.read_i32()?;
        if node_count < 0 || string_buffer_size < 0 {
            return Err(BinaryError::invalid_data(format!(
                "Invalid typetree header: {} nodes, {} string bytes",
                node_count, string_buffer_size
            )));
        }

        let mut raw_nodes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            let version = reader.read_u16()? as i32;
            let level = reader.read_u8()? as i32;
            let type_flags = reader.read_u8()? as i32;
            let type_offset = reader.read_u32()?;
            let name_offset = reader.read_u32()?;
            let byte_size = reader.read_i32()?;
            let index = reader.read_i32()?;
            let meta_flags = reader.read_i32()?;
            let ref_type_hash = if format >= 19 { reader.read_u64()? } else { 0 };

            raw_nodes.push((
                TypeTreeNode {
                    version,
                    level,
                    type_flags,
                    byte_size,
                    index,
                    meta_flags,
                    ref_type_hash,
                    ..Default::default()
                },
                type_offset,
                name_offset,
            ));
        }

        let string_buffer = reader.take(string_buffer_size as usize)?;
        let flat = raw_nodes
            .into_iter()
            .map(|(mut node, type_offset, name_offset)| {
                node.type_name = Self::resolve_string(string_buffer, type_offset)?;
                node.name = Self::resolve_string(string_buffer, name_offset)?;
                Ok(node)
            })
            .collect::<Result<Vec<_>>>()?;

        TypeTreeNode::from_flat(flat)
    }

    fn read_legacy_node(
        reader: &mut BinaryReader,
        format: u32,
        level: i32,
        out: &mut Vec<TypeTreeNode>,
    ) -> Result<()> {
        let mut node = TypeTreeNode {
            level,
            ..Default::default()
        };
        node.type_name = reader.read_cstring()?;
        node.name = reader.read_cstring()?;
        node.byte_size = reader.read_i32()?;
        if format == 2 {
            let _variable_count = reader.read_i32()?;
        }
        if format != 3 {
            node.index = reader.read_i32()?;
        }
        node.type_flags = reader.read_i32()?;
        node.version = reader.read_i32()?;
        if format != 3 {
            node.meta_flags = reader.read_i32()?;
        }
        out.push(node);

        let children = reader.read_i32()?;
        for _ in 0..children {
            Self::read_legacy_node(reader, format, level + 1, out)?;
        }
        Ok(())
    }

    fn resolve_string(buffer: &[u8], offset: u32) -> Result<String> {
        if offset & 0x8000_0000 != 0 {
            let common = offset & 0x7FFF_FFFF;
            return common_string(common)
                .map(str::to_string)
                .ok_or_else(|| {
                    BinaryError::invalid_data(format!("Unknown common string offset {}", common))
                });
        }

        let start = offset as usize;
        if start >= buffer.len() {
            return Err(BinaryError::invalid_data(format!(
                "String offset {} outside buffer of {} bytes",
                start,
                buffer.len()
            )));
        }
        let end = buffer[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|len| start + len)
            .unwrap_or(buffer.len());
        Ok(String::from_utf8_lossy(&buffer[start..end]).into_owned())
    }
}

/// Writes typetrees in the blob layout, all strings in the local buffer
pub struct TypeTreeBlobWriter;

impl TypeTreeBlobWriter {
    pub fn write(root: &TypeTreeNode, writer: &mut BinaryWriter, format: u32) {
        let flat = root.to_flat();
        let mut strings: Vec<u8> = Vec::new();
        let mut offsets: HashMap<String, u32> = HashMap::new();
        let mut intern = |text: &str| -> u32 {
            if let Some(offset) = offsets.get(text) {
                return *offset;
            }
            let offset = strings.len() as u32;
            strings.extend_from_slice(text.as_bytes());
            strings.push(0);
            offsets.insert(text.to_string(), offset);
            offset
        };
        let string_refs: Vec<(u32, u32)> = flat
            .iter()
            .map(|node| (intern(&node.type_name), intern(&node.name)))
            .collect();

        writer.write_i32(flat.len() as i32);
        writer.write_i32(strings.len() as i32);
        for (index, (node, (type_offset, name_offset))) in flat.iter().zip(string_refs).enumerate() {
            writer.write_u16(node.version as u16);
            writer.write_u8(node.level as u8);
            writer.write_u8(node.type_flags as u8);
            writer.write_u32(type_offset);
            writer.write_u32(name_offset);
            writer.write_i32(node.byte_size);
            writer.write_i32(index as i32);
            writer.write_i32(node.meta_flags);
            if format >= 19 {
                writer.write_u64(node.ref_type_hash);
            }
        }
        writer.write_bytes(&strings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ByteOrder;

    fn blob_node(writer: &mut BinaryWriter, level: u8, flags: u8, type_off: u32, name_off: u32) {
        writer.write_u16(1);
        writer.write_u8(level);
        writer.write_u8(flags);
        writer.write_u32(type_off);
        writer.write_u32(name_off);
        writer.write_i32(-1);
        writer.write_i32(0);
        writer.write_i32(0);
    }

    #[test]
    fn test_blob_with_common_and_local_strings() {
        let local = b"Custom\0m_Value\0";
        let mut writer = BinaryWriter::new(ByteOrder::Little);
        writer.write_i32(3);
        writer.write_i32(local.len() as i32);
        blob_node(&mut writer, 0, 0, 0, 0x8000_0000 | 55); // Custom / Base
        blob_node(&mut writer, 1, 0, 0x8000_0000 | 222, 7); // int / m_Value
        blob_node(&mut writer, 1, 0, 0x8000_0000 | 840, 0x8000_0000 | 427); // string / m_Name
        writer.write_bytes(local);
        let data = writer.into_inner();

        let mut reader = BinaryReader::new(&data, ByteOrder::Little);
        let root = TypeTreeParser::from_reader(&mut reader, 17).unwrap();

        assert_eq!(root.type_name, "Custom");
        assert_eq!(root.name, "Base");
        assert_eq!(root.children[0].type_name, "int");
        assert_eq!(root.children[0].name, "m_Value");
        assert_eq!(root.children[1].type_name, "string");
        assert_eq!(root.children[1].name, "m_Name");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_blob_writer_output_parses() {
        let root = TypeTreeNode::from_flat(vec![
            TypeTreeNode::with_info("Texture2D", "Base", 0),
            TypeTreeNode::with_info("string", "m_Name", 1),
            TypeTreeNode::with_info("int", "m_Width", 1),
        ])
        .unwrap();
        let mut writer = BinaryWriter::new(ByteOrder::Little);
        TypeTreeBlobWriter::write(&root, &mut writer, 22);
        let data = writer.into_inner();

        let mut reader = BinaryReader::new(&data, ByteOrder::Little);
        let parsed = TypeTreeParser::from_reader(&mut reader, 22).unwrap();
        assert_eq!(parsed.children[1].name, "m_Width");
        assert_eq!(parsed.children[1].index, 2);
    }

    #[test]
    fn test_legacy_layout() {
        let mut writer = BinaryWriter::new(ByteOrder::Little);
        for (type_name, name, children) in [("TextAsset", "Base", 1), ("int", "m_Flag", 0)] {
            writer.write_cstring(type_name);
            writer.write_cstring(name);
            writer.write_i32(4);
            writer.write_i32(0);
            writer.write_i32(0);
            writer.write_i32(1);
            writer.write_i32(0x4000);
            writer.write_i32(children);
        }
        let data = writer.into_inner();

        let mut reader = BinaryReader::new(&data, ByteOrder::Little);
        let root = TypeTreeParser::from_reader(&mut reader, 9).unwrap();
        assert_eq!(root.children.len(), 1);
        assert!(root.children[0].is_aligned());
    }
}
