//! SerializedFile parser
//!
//! Besides decoding the metadata, the parser keeps the raw bytes of the
//! type table and of everything after the object table so the writer can
//! emit them unchanged.

use super::SerializedFile;
use super::header::SerializedFileHeader;
use super::types::{FileIdentifier, LocalObjectIdentifier, ObjectInfo, SerializedType};
use crate::error::{BinaryError, Result};
use crate::reader::{BinaryReader, ByteOrder};
use indexmap::IndexMap;

/// SerializedFile parser
pub struct SerializedFileParser;

impl SerializedFileParser {
    /// Parse a serialized file; object bytes are copied out of `data`
    pub fn parse(name: &str, data: &[u8]) -> Result<SerializedFile> {
        let mut reader = BinaryReader::new(data, ByteOrder::Big);
        let header = SerializedFileHeader::from_reader(&mut reader)?;
        let format = header.version;
        reader.set_byte_order(header.byte_order());

        let unity_version = if format >= 7 {
            reader.read_cstring()?
        } else {
            String::new()
        };
        let target_platform = if format >= 8 { reader.read_i32()? } else { 0 };
        let enable_type_tree = if format >= 13 {
            reader.read_bool()?
        } else {
            true
        };

        let types_start = reader.position();
        let type_count = read_count(&mut reader)?;
        let mut types = Vec::with_capacity(type_count);
        for _ in 0..type_count {
            types.push(SerializedType::from_reader(
                &mut reader,
                format,
                enable_type_tree,
                false,
            )?);
        }
        let types_section = data[types_start..reader.position()].to_vec();

        let big_id_enabled = if (7..14).contains(&format) {
            reader.read_i32()?
        } else {
            0
        };

        let object_count = read_count(&mut reader)?;
        let mut infos = Vec::with_capacity(object_count);
        for _ in 0..object_count {
            infos.push(Self::read_object_info(
                &mut reader,
                format,
                big_id_enabled != 0,
                &types,
            )?);
        }

        let tail_start = reader.position();
        let mut script_types = Vec::new();
        if format >= 11 {
            let count = read_count(&mut reader)?;
            for _ in 0..count {
                script_types.push(LocalObjectIdentifier::from_reader(&mut reader, format)?);
            }
        }

        let count = read_count(&mut reader)?;
        let mut externals = Vec::with_capacity(count);
        for _ in 0..count {
            externals.push(FileIdentifier::from_reader(&mut reader, format)?);
        }

        let mut ref_types = Vec::new();
        if format >= 20 {
            let count = read_count(&mut reader)?;
            for _ in 0..count {
                ref_types.push(SerializedType::from_reader(
                    &mut reader,
                    format,
                    enable_type_tree,
                    true,
                )?);
            }
        }

        let user_information = if format >= 5 {
            reader.read_cstring()?
        } else {
            String::new()
        };
        let tail_section = data[tail_start..reader.position()].to_vec();

        let mut objects = IndexMap::with_capacity(infos.len());
        for info in infos {
            let start = (header.data_offset + info.byte_start) as usize;
            let end = start + info.byte_size as usize;
            if end > data.len() {
                return Err(BinaryError::not_enough_data(end, data.len()));
            }
            let bytes = data[start..end].to_vec();
            objects.insert(info.path_id, (info, bytes));
        }

        Ok(SerializedFile::from_parts(
            name,
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
            objects,
        ))
    }

    fn read_object_info(
        reader: &mut BinaryReader,
        format: u32,
        big_id_enabled: bool,
        types: &[SerializedType],
    ) -> Result<ObjectInfo> {
        let path_id = if big_id_enabled {
            reader.read_i64()?
        } else if format < 14 {
            reader.read_i32()? as i64
        } else {
            reader.align()?;
            reader.read_i64()?
        };
        let byte_start = if format >= 22 {
            reader.read_i64()? as u64
        } else {
            reader.read_u32()? as u64
        };
        let byte_size = reader.read_u32()?;
        let type_id = reader.read_i32()?;

        let (class_id, legacy_class_id) = if format < 16 {
            let raw = reader.read_u16()?;
            let class_id = types
                .iter()
                .find(|t| t.class_id == type_id)
                .map(|t| t.class_id)
                .unwrap_or(raw as i32);
            (class_id, Some(raw))
        } else {
            let class_id = types
                .get(type_id as usize)
                .map(|t| t.class_id)
                .ok_or_else(|| {
                    BinaryError::invalid_data(format!(
                        "Object {} refers to missing type {}",
                        path_id, type_id
                    ))
                })?;
            (class_id, None)
        };

        let is_destroyed = if format < 11 {
            Some(reader.read_u16()?)
        } else {
            None
        };
        let script_type_index = if (11..17).contains(&format) {
            Some(reader.read_i16()?)
        } else {
            None
        };
        let stripped = if format == 15 || format == 16 {
            Some(reader.read_u8()?)
        } else {
            None
        };

        Ok(ObjectInfo {
            path_id,
            byte_start,
            byte_size,
            type_id,
            // Script types below format 16 use negative ids
            class_id: if class_id < 0 { 114 } else { class_id },
            legacy_class_id,
            is_destroyed,
            script_type_index,
            stripped,
        })
    }
}

fn read_count(reader: &mut BinaryReader) -> Result<usize> {
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(BinaryError::invalid_data(format!("Negative count: {}", count)));
    }
    Ok(count as usize)
}
