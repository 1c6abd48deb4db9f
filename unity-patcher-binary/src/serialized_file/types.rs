//! Metadata records of a serialized file

use crate::error::Result;
use crate::reader::BinaryReader;
use crate::typetree::{TypeTreeNode, TypeTreeParser};

/// MonoBehaviour class id
const MONO_BEHAVIOUR: i32 = 114;

/// One entry of the type table
#[derive(Debug, Clone, Default)]
pub struct SerializedType {
    /// Unity class ID
    pub class_id: i32,
    pub is_stripped_type: bool,
    /// Index into the script table (MonoBehaviour types)
    pub script_type_index: i16,
    pub script_id: Option<[u8; 16]>,
    pub old_type_hash: [u8; 16],
    /// Field layout, when the file carries typetrees
    pub type_tree: Option<TypeTreeNode>,
    pub type_dependencies: Vec<i32>,
    /// Set for entries of the ref-type table
    pub class_name: String,
    pub namespace: String,
    pub assembly_name: String,
}

impl SerializedType {
    pub fn from_reader(
        reader: &mut BinaryReader,
        format: u32,
        enable_type_tree: bool,
        is_ref_type: bool,
    ) -> Result<Self> {
        let mut entry = SerializedType {
            class_id: reader.read_i32()?,
            script_type_index: -1,
            ..Default::default()
        };

        if format >= 16 {
            entry.is_stripped_type = reader.read_bool()?;
        }
        if format >= 17 {
            entry.script_type_index = reader.read_i16()?;
        }
        if format >= 13 {
            let has_script_id = (is_ref_type && entry.script_type_index >= 0)
                || (format < 16 && entry.class_id < 0)
                || (format >= 16 && entry.class_id == MONO_BEHAVIOUR);
            if has_script_id {
                entry.script_id = Some(read_hash(reader)?);
            }
            entry.old_type_hash = read_hash(reader)?;
        }

        if enable_type_tree {
            entry.type_tree = Some(TypeTreeParser::from_reader(reader, format)?);
            if format >= 21 {
                if is_ref_type {
                    entry.class_name = reader.read_cstring()?;
                    entry.namespace = reader.read_cstring()?;
                    entry.assembly_name = reader.read_cstring()?;
                } else {
                    let count = reader.read_i32()?.max(0);
                    entry.type_dependencies = (0..count)
                        .map(|_| reader.read_i32())
                        .collect::<Result<_>>()?;
                }
            }
        }

        Ok(entry)
    }
}

fn read_hash(reader: &mut BinaryReader) -> Result<[u8; 16]> {
    let mut hash = [0u8; 16];
    hash.copy_from_slice(reader.take(16)?);
    Ok(hash)
}

/// Location of one object inside the data section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub path_id: i64,
    /// Offset relative to the data section
    pub byte_start: u64,
    pub byte_size: u32,
    pub type_id: i32,
    /// Resolved Unity class id
    pub class_id: i32,
    /// Raw class id column (formats below 16)
    pub legacy_class_id: Option<u16>,
    pub is_destroyed: Option<u16>,
    pub script_type_index: Option<i16>,
    pub stripped: Option<u8>,
}

/// A reference to an external file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIdentifier {
    pub guid: [u8; 16],
    pub type_: i32,
    pub path: String,
}

impl FileIdentifier {
    pub fn from_reader(reader: &mut BinaryReader, format: u32) -> Result<Self> {
        if format >= 6 {
            reader.read_cstring()?;
        }
        let mut identifier = FileIdentifier::default();
        if format >= 5 {
            identifier.guid = read_hash(reader)?;
            identifier.type_ = reader.read_i32()?;
        }
        identifier.path = reader.read_cstring()?;
        Ok(identifier)
    }

    /// File name used for lookups, e.g. `archive:/CAB-1/CAB-1` -> `CAB-1`
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}

/// Entry of the script table: which file and object hold a MonoScript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalObjectIdentifier {
    pub file_index: i32,
    pub path_id: i64,
}

impl LocalObjectIdentifier {
    pub fn from_reader(reader: &mut BinaryReader, format: u32) -> Result<Self> {
        let file_index = reader.read_i32()?;
        let path_id = if format < 14 {
            reader.read_i32()? as i64
        } else {
            reader.align()?;
            reader.read_i64()?
        };
        Ok(Self {
            file_index,
            path_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_identifier_name() {
        let identifier = FileIdentifier {
            path: "archive:/CAB-abc/CAB-abc".to_string(),
            ..Default::default()
        };
        assert_eq!(identifier.file_name(), "CAB-abc");

        let plain = FileIdentifier {
            path: "sharedassets0.assets".to_string(),
            ..Default::default()
        };
        assert_eq!(plain.file_name(), "sharedassets0.assets");
    }
}
