//! Unity SerializedFile (`.assets`, `level0`, `CAB-*` entries)
//!
//! A parsed file owns a copy of every object's bytes. Object edits replace
//! those bytes and flag the file as changed; [`SerializedFile::to_bytes`]
//! rebuilds the object table and data section around the untouched
//! metadata.

pub mod header;
pub mod parser;
pub mod types;
mod writer;

pub use header::{MIN_SUPPORTED_FORMAT, SerializedFileHeader};
pub use parser::SerializedFileParser;
pub use types::{FileIdentifier, LocalObjectIdentifier, ObjectInfo, SerializedType};

use crate::error::{BinaryError, Result};
use crate::reader::ByteOrder;
use crate::typetree::{TypeTreeBlobWriter, TypeTreeNode};
use crate::unity_version::UnityVersion;
use crate::writer::BinaryWriter;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type ObjectTable = IndexMap<i64, (ObjectInfo, Vec<u8>)>;

/// A parsed serialized file
#[derive(Debug)]
pub struct SerializedFile {
    name: String,
    pub header: SerializedFileHeader,
    pub unity_version: String,
    pub target_platform: i32,
    pub enable_type_tree: bool,
    pub types: Vec<SerializedType>,
    pub big_id_enabled: i32,
    pub script_types: Vec<LocalObjectIdentifier>,
    pub externals: Vec<FileIdentifier>,
    pub ref_types: Vec<SerializedType>,
    pub user_information: String,
    types_section: Vec<u8>,
    tail_section: Vec<u8>,
    objects: RwLock<ObjectTable>,
    changed: AtomicBool,
    parent: Option<String>,
}

impl SerializedFile {
    /// Parse a serialized file
    pub fn from_bytes(name: &str, data: &[u8]) -> Result<Self> {
        SerializedFileParser::parse(name, data)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        name: &str,
        header: SerializedFileHeader,
        unity_version: String,
        target_platform: i32,
        enable_type_tree: bool,
        types: Vec<SerializedType>,
        big_id_enabled: i32,
        script_types: Vec<LocalObjectIdentifier>,
        externals: Vec<FileIdentifier>,
        ref_types: Vec<SerializedType>,
        user_information: String,
        types_section: Vec<u8>,
        tail_section: Vec<u8>,
        objects: ObjectTable,
    ) -> Self {
        Self {
            name: name.to_string(),
            header,
            unity_version,
            target_platform,
            enable_type_tree,
            types,
            big_id_enabled,
            script_types,
            externals,
            ref_types,
            user_information,
            types_section,
            tail_section,
            objects: RwLock::new(objects),
            changed: AtomicBool::new(false),
            parent: None,
        }
    }

    /// Record the bundle this file lives in
    pub fn with_parent(mut self, bundle_name: &str) -> Self {
        self.parent = Some(bundle_name.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the containing bundle, if any
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Serialized file format number
    pub fn format(&self) -> u32 {
        self.header.version
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order()
    }

    /// Parsed engine version; stripped or malformed strings give `0.0.0`
    pub fn version(&self) -> UnityVersion {
        self.unity_version.parse().unwrap_or_default()
    }

    fn read_table(&self) -> RwLockReadGuard<'_, ObjectTable> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, ObjectTable> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path ids in table order
    pub fn object_ids(&self) -> Vec<i64> {
        self.read_table().keys().copied().collect()
    }

    pub fn object_count(&self) -> usize {
        self.read_table().len()
    }

    pub fn object_info(&self, path_id: i64) -> Option<ObjectInfo> {
        self.read_table().get(&path_id).map(|(info, _)| info.clone())
    }

    pub fn object_data(&self, path_id: i64) -> Option<Vec<u8>> {
        self.read_table().get(&path_id).map(|(_, data)| data.clone())
    }

    /// Replace an object's bytes and flag the file as changed
    pub fn set_object_data(&self, path_id: i64, data: Vec<u8>) -> Result<()> {
        let mut table = self.write_table();
        let (info, slot) = table.get_mut(&path_id).ok_or_else(|| {
            BinaryError::not_found(format!("Object {} not found in {}", path_id, self.name))
        })?;
        info.byte_size = data.len() as u32;
        *slot = data;
        self.mark_changed();
        Ok(())
    }

    /// Type table entry describing an object
    pub fn serialized_type(&self, info: &ObjectInfo) -> Option<&SerializedType> {
        if self.format() >= 16 {
            usize::try_from(info.type_id)
                .ok()
                .and_then(|idx| self.types.get(idx))
        } else {
            self.types.iter().find(|t| t.class_id == info.type_id)
        }
    }

    /// Embedded field layout of an object, when present
    pub fn type_tree(&self, info: &ObjectInfo) -> Option<&TypeTreeNode> {
        self.serialized_type(info)
            .and_then(|t| t.type_tree.as_ref())
            .filter(|tree| !tree.children.is_empty())
    }

    /// External file referenced by a PPtr `m_FileID` (1-based)
    pub fn external(&self, file_id: i32) -> Option<&FileIdentifier> {
        usize::try_from(file_id - 1)
            .ok()
            .and_then(|idx| self.externals.get(idx))
    }

    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    pub fn mark_changed(&self) {
        self.changed.store(true, Ordering::Release);
    }

    pub(crate) fn objects_snapshot(&self) -> Vec<(ObjectInfo, Vec<u8>)> {
        self.read_table().values().cloned().collect()
    }

    /// Serialize the file with its current object bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        writer::write(self)
    }
}

/// Assembles a serialized file from layouts and object bytes
#[derive(Debug)]
pub struct SerializedFileBuilder {
    name: String,
    format: u32,
    unity_version: String,
    byte_order: ByteOrder,
    types: Vec<SerializedType>,
    objects: ObjectTable,
}

impl SerializedFileBuilder {
    pub fn new(name: &str, unity_version: &str) -> Self {
        Self {
            name: name.to_string(),
            format: 22,
            unity_version: unity_version.to_string(),
            byte_order: ByteOrder::Little,
            types: Vec::new(),
            objects: IndexMap::new(),
        }
    }

    /// Serialized file format number (17 or newer)
    pub fn format(mut self, format: u32) -> Self {
        self.format = format.max(17);
        self
    }

    /// Register a class layout; returns its type index
    pub fn add_type(&mut self, class_id: i32, tree: TypeTreeNode) -> i32 {
        self.types.push(SerializedType {
            class_id,
            script_type_index: -1,
            script_id: (class_id == 114).then_some([0u8; 16]),
            type_tree: Some(tree),
            ..Default::default()
        });
        self.types.len() as i32 - 1
    }

    /// Add an object of a registered type
    pub fn add_object(&mut self, path_id: i64, type_index: i32, data: Vec<u8>) -> Result<()> {
        let class_id = self
            .types
            .get(type_index as usize)
            .map(|t| t.class_id)
            .ok_or_else(|| BinaryError::not_found(format!("Type {} not registered", type_index)))?;
        let info = ObjectInfo {
            path_id,
            byte_start: 0,
            byte_size: data.len() as u32,
            type_id: type_index,
            class_id,
            legacy_class_id: None,
            is_destroyed: None,
            script_type_index: None,
            stripped: None,
        };
        self.objects.insert(path_id, (info, data));
        Ok(())
    }

    pub fn build(self) -> SerializedFile {
        let format = self.format;
        let mut types = BinaryWriter::new(self.byte_order);
        types.write_i32(self.types.len() as i32);
        for entry in &self.types {
            types.write_i32(entry.class_id);
            types.write_bool(entry.is_stripped_type);
            types.write_i16(entry.script_type_index);
            if let Some(script_id) = entry.script_id {
                types.write_bytes(&script_id);
            }
            types.write_bytes(&entry.old_type_hash);
            if let Some(tree) = &entry.type_tree {
                TypeTreeBlobWriter::write(tree, &mut types, format);
            }
            if format >= 21 {
                types.write_i32(0);
            }
        }

        let mut tail = BinaryWriter::new(self.byte_order);
        tail.write_i32(0); // scripts
        tail.write_i32(0); // externals
        if format >= 20 {
            tail.write_i32(0);
        }
        tail.write_cstring("");

        let header = SerializedFileHeader {
            metadata_size: 0,
            file_size: 0,
            version: format,
            data_offset: 0,
            endian: if self.byte_order == ByteOrder::Big { 1 } else { 0 },
            reserved: [0; 3],
        };
        SerializedFile::from_parts(
            &self.name,
            header,
            self.unity_version,
            19,
            true,
            self.types,
            0,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            String::new(),
            types.into_inner(),
            tail.into_inner(),
            self.objects,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_asset_tree() -> TypeTreeNode {
        let mut name = TypeTreeNode::with_info("string", "m_Name", 1);
        name.meta_flags = 0x8000;
        let mut array = TypeTreeNode::with_info("Array", "Array", 2);
        array.type_flags = 1;
        array.meta_flags = 0x4000;
        TypeTreeNode::from_flat(vec![
            TypeTreeNode::with_info("TextAsset", "Base", 0),
            name,
            array,
            TypeTreeNode::with_info("int", "size", 3),
            TypeTreeNode::with_info("char", "data", 3),
        ])
        .unwrap()
    }

    fn name_bytes(name: &str) -> Vec<u8> {
        let mut data = (name.len() as i32).to_le_bytes().to_vec();
        data.extend_from_slice(name.as_bytes());
        while data.len() % 4 != 0 {
            data.push(0);
        }
        data
    }

    #[test]
    fn test_builder_output_reparses() {
        let mut builder = SerializedFileBuilder::new("CAB-test", "2021.3.5f1");
        let text_type = builder.add_type(49, text_asset_tree());
        builder.add_object(1, text_type, name_bytes("readme")).unwrap();
        builder.add_object(-7, text_type, name_bytes("credits")).unwrap();
        let bytes = builder.build().to_bytes().unwrap();

        assert!(SerializedFileHeader::looks_valid(&bytes));
        let file = SerializedFile::from_bytes("CAB-test", &bytes).unwrap();
        assert_eq!(file.object_ids(), vec![1, -7]);
        assert_eq!(file.object_info(-7).map(|i| i.class_id), Some(49));
        assert_eq!(file.object_data(1), Some(name_bytes("readme")));
        assert_eq!(file.version().major, 2021);
        assert_eq!(file.header.data_offset, 0x1000);
        assert!(!file.is_changed());
    }

    #[test]
    fn test_set_object_data_rewrites_offsets() {
        let mut builder = SerializedFileBuilder::new("level0", "2019.4.40f1").format(19);
        let text_type = builder.add_type(49, text_asset_tree());
        builder.add_object(1, text_type, name_bytes("a")).unwrap();
        builder.add_object(2, text_type, name_bytes("b")).unwrap();
        let file = SerializedFile::from_bytes("level0", &builder.build().to_bytes().unwrap()).unwrap();

        file.set_object_data(1, name_bytes("a much longer name")).unwrap();
        assert!(file.is_changed());
        assert!(file.set_object_data(99, Vec::new()).is_err());

        let reparsed = SerializedFile::from_bytes("level0", &file.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed.object_data(1), Some(name_bytes("a much longer name")));
        assert_eq!(reparsed.object_data(2), Some(name_bytes("b")));
        let second = reparsed.object_info(2).unwrap();
        assert_eq!(second.byte_start % 8, 0);
        assert!(reparsed.type_tree(&second).is_some());
    }
}
