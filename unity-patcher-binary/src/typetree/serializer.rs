//! Typetree-driven object (de)serialization
//!
//! Converts object bytes to a [`UnityValue`] tree and back, walking the
//! typetree node by node. Alignment follows the node meta flags: a vector
//! aligns after its `Array` child when that child is flagged, then again
//! when the field itself is flagged.

use super::types::TypeTreeNode;
use crate::error::{BinaryError, Result};
use crate::reader::BinaryReader;
use crate::writer::BinaryWriter;
use indexmap::IndexMap;
use unity_patcher_core::{UnityAssetError, UnityValue};

/// TypeTree serializer bound to the root node of one class
pub struct TypeTreeSerializer<'a> {
    root: &'a TypeTreeNode,
}

impl<'a> TypeTreeSerializer<'a> {
    pub fn new(root: &'a TypeTreeNode) -> Self {
        Self { root }
    }

    /// Read a whole object; the root's children become the top-level fields
    pub fn read_object(&self, reader: &mut BinaryReader) -> Result<UnityValue> {
        let mut fields = IndexMap::with_capacity(self.root.children.len());
        for child in &self.root.children {
            let value = read_value(reader, child)?;
            fields.insert(child.name.clone(), value);
        }
        Ok(UnityValue::Object(fields))
    }

    /// Write a whole object in the root's field order
    pub fn write_object(&self, value: &UnityValue, writer: &mut BinaryWriter) -> Result<()> {
        write_class(writer, self.root, value)
    }
}

fn read_value(reader: &mut BinaryReader, node: &TypeTreeNode) -> Result<UnityValue> {
    let mut align = node.is_aligned();

    let value = match node.type_name.as_str() {
        "SInt8" => UnityValue::Integer(reader.read_i8()? as i64),
        "UInt8" | "char" => UnityValue::Integer(reader.read_u8()? as i64),
        "SInt16" | "short" => UnityValue::Integer(reader.read_i16()? as i64),
        "UInt16" | "unsigned short" => UnityValue::Integer(reader.read_u16()? as i64),
        "SInt32" | "int" => UnityValue::Integer(reader.read_i32()? as i64),
        "UInt32" | "unsigned int" | "Type*" => UnityValue::Integer(reader.read_u32()? as i64),
        "SInt64" | "long long" => UnityValue::Integer(reader.read_i64()?),
        "UInt64" | "unsigned long long" | "FileSize" => {
            UnityValue::Integer(reader.read_u64()? as i64)
        }
        "float" => UnityValue::Float(reader.read_f32()? as f64),
        "double" => UnityValue::Float(reader.read_f64()?),
        "bool" => UnityValue::Bool(reader.read_bool()?),
        "string" => {
            let bytes = reader.read_byte_string()?;
            align |= node.children.first().map(|c| c.is_aligned()).unwrap_or(false);
            match std::str::from_utf8(bytes) {
                Ok(text) => UnityValue::String(text.to_string()),
                Err(_) => UnityValue::Bytes(bytes.to_vec()),
            }
        }
        "TypelessData" => {
            let size = read_length(reader)?;
            UnityValue::Bytes(reader.read_bytes(size)?)
        }
        "pair" => {
            let (first, second) = pair_nodes(node)?;
            let mut fields = IndexMap::with_capacity(2);
            fields.insert("first".to_string(), read_value(reader, first)?);
            fields.insert("second".to_string(), read_value(reader, second)?);
            UnityValue::Object(fields)
        }
        "map" => {
            let array = array_node(node)?;
            align |= array.is_aligned();
            let (first, second) = pair_nodes(element_node(array)?)?;
            let size = read_length(reader)?;
            let mut entries = Vec::with_capacity(size.min(reader.remaining()));
            for _ in 0..size {
                let key = read_value(reader, first)?;
                let value = read_value(reader, second)?;
                entries.push(UnityValue::Array(vec![key, value]));
            }
            UnityValue::Array(entries)
        }
        "ReferencedObject" | "ManagedReferencesRegistry" => {
            return Err(BinaryError::unsupported(format!(
                "Managed references ({}) are not supported",
                node.name
            )));
        }
        _ if node.children.first().map(|c| c.is_array()).unwrap_or(false) => {
            let array = &node.children[0];
            align |= array.is_aligned();
            let element = element_node(array)?;
            let size = read_length(reader)?;
            let mut items = Vec::with_capacity(size.min(reader.remaining()));
            for _ in 0..size {
                items.push(read_value(reader, element)?);
            }
            UnityValue::Array(items)
        }
        _ => {
            let mut fields = IndexMap::with_capacity(node.children.len());
            for child in &node.children {
                fields.insert(child.name.clone(), read_value(reader, child)?);
            }
            UnityValue::Object(fields)
        }
    };

    if align {
        reader.align()?;
    }
    Ok(value)
}

fn write_value(writer: &mut BinaryWriter, node: &TypeTreeNode, value: &UnityValue) -> Result<()> {
    let mut align = node.is_aligned();

    match node.type_name.as_str() {
        "SInt8" => writer.write_i8(integer(node, value)? as i8),
        "UInt8" | "char" => writer.write_u8(integer(node, value)? as u8),
        "SInt16" | "short" => writer.write_i16(integer(node, value)? as i16),
        "UInt16" | "unsigned short" => writer.write_u16(integer(node, value)? as u16),
        "SInt32" | "int" => writer.write_i32(integer(node, value)? as i32),
        "UInt32" | "unsigned int" | "Type*" => writer.write_u32(integer(node, value)? as u32),
        "SInt64" | "long long" => writer.write_i64(integer(node, value)?),
        "UInt64" | "unsigned long long" | "FileSize" => {
            writer.write_u64(integer(node, value)? as u64)
        }
        "float" => writer.write_f32(float(node, value)? as f32),
        "double" => writer.write_f64(float(node, value)?),
        "bool" => writer.write_bool(
            value
                .as_bool()
                .ok_or_else(|| mismatch(node, value, "bool"))?,
        ),
        "string" => {
            let bytes = value.as_bytes().ok_or_else(|| mismatch(node, value, "string"))?;
            writer.write_i32(bytes.len() as i32);
            writer.write_bytes(bytes);
            align |= node.children.first().map(|c| c.is_aligned()).unwrap_or(false);
        }
        "TypelessData" => {
            let bytes = value.to_bytes().ok_or_else(|| mismatch(node, value, "bytes"))?;
            writer.write_i32(bytes.len() as i32);
            writer.write_bytes(&bytes);
        }
        "pair" => {
            let (first, second) = pair_nodes(node)?;
            let (a, b) = pair_values(node, value)?;
            write_value(writer, first, a)?;
            write_value(writer, second, b)?;
        }
        "map" => {
            let array = array_node(node)?;
            align |= array.is_aligned();
            let (first, second) = pair_nodes(element_node(array)?)?;
            let entries = value.as_array().ok_or_else(|| mismatch(node, value, "array"))?;
            writer.write_i32(entries.len() as i32);
            for entry in entries {
                let (key, item) = pair_values(node, entry)?;
                write_value(writer, first, key)?;
                write_value(writer, second, item)?;
            }
        }
        _ if node.children.first().map(|c| c.is_array()).unwrap_or(false) => {
            let array = &node.children[0];
            align |= array.is_aligned();
            let element = element_node(array)?;
            match value {
                UnityValue::Array(items) => {
                    writer.write_i32(items.len() as i32);
                    for item in items {
                        write_value(writer, element, item)?;
                    }
                }
                UnityValue::Bytes(_) | UnityValue::String(_)
                    if matches!(element.type_name.as_str(), "UInt8" | "char" | "SInt8") =>
                {
                    let bytes = value.as_bytes().unwrap_or_default();
                    writer.write_i32(bytes.len() as i32);
                    writer.write_bytes(bytes);
                }
                _ => return Err(mismatch(node, value, "array")),
            }
        }
        _ => write_class(writer, node, value)?,
    }

    if align {
        writer.align();
    }
    Ok(())
}

fn write_class(writer: &mut BinaryWriter, node: &TypeTreeNode, value: &UnityValue) -> Result<()> {
    let fields = value
        .as_object()
        .ok_or_else(|| mismatch(node, value, "object"))?;
    for child in &node.children {
        let field = fields.get(&child.name).ok_or_else(|| {
            BinaryError::from(UnityAssetError::property_not_found(
                child.name.as_str(),
                node.type_name.as_str(),
            ))
        })?;
        write_value(writer, child, field)?;
    }
    Ok(())
}

fn read_length(reader: &mut BinaryReader) -> Result<usize> {
    let size = reader.read_i32()?;
    if size < 0 {
        return Err(BinaryError::invalid_data(format!("Negative array size: {}", size)));
    }
    Ok(size as usize)
}

fn array_node(node: &TypeTreeNode) -> Result<&TypeTreeNode> {
    node.children
        .first()
        .ok_or_else(|| BinaryError::invalid_data(format!("'{}' has no Array node", node.name)))
}

fn element_node(array: &TypeTreeNode) -> Result<&TypeTreeNode> {
    array
        .children
        .get(1)
        .ok_or_else(|| BinaryError::invalid_data("Array node without element type"))
}

fn pair_nodes(node: &TypeTreeNode) -> Result<(&TypeTreeNode, &TypeTreeNode)> {
    match (node.children.first(), node.children.get(1)) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(BinaryError::invalid_data(format!(
            "'{}' is not a pair",
            node.name
        ))),
    }
}

fn pair_values<'v>(
    node: &TypeTreeNode,
    value: &'v UnityValue,
) -> Result<(&'v UnityValue, &'v UnityValue)> {
    match value {
        UnityValue::Array(items) if items.len() == 2 => Ok((&items[0], &items[1])),
        UnityValue::Object(fields) => match (fields.get("first"), fields.get("second")) {
            (Some(first), Some(second)) => Ok((first, second)),
            _ => Err(mismatch(node, value, "pair")),
        },
        _ => Err(mismatch(node, value, "pair")),
    }
}

fn integer(node: &TypeTreeNode, value: &UnityValue) -> Result<i64> {
    value.to_i64().ok_or_else(|| mismatch(node, value, "integer"))
}

fn float(node: &TypeTreeNode, value: &UnityValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| mismatch(node, value, "float"))
}

fn mismatch(node: &TypeTreeNode, value: &UnityValue, expected: &str) -> BinaryError {
    UnityAssetError::type_conversion(
        format!("{} ({})", value.kind(), node.name),
        expected.to_string(),
    )
    .into()
}
