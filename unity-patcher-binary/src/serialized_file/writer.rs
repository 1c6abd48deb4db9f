//! SerializedFile writer
//!
//! Re-emits the metadata with a rebuilt object table. Objects are laid out
//! in table order, each on an 8-byte boundary; the data section starts on
//! a 16-byte boundary and never before 0x1000 when the metadata is small.

use super::SerializedFile;
use super::header::SerializedFileHeader;
use super::types::ObjectInfo;
use crate::error::Result;
use crate::writer::BinaryWriter;

pub(crate) fn write(file: &SerializedFile) -> Result<Vec<u8>> {
    let format = file.header.version;
    let byte_order = file.header.byte_order();
    let objects = file.objects_snapshot();

    let mut data = BinaryWriter::new(byte_order);
    let mut infos: Vec<ObjectInfo> = Vec::with_capacity(objects.len());
    for (info, bytes) in &objects {
        data.align_to(8);
        let mut info = info.clone();
        info.byte_start = data.position() as u64;
        info.byte_size = bytes.len() as u32;
        data.write_bytes(bytes);
        infos.push(info);
    }

    let header_size = file.header.size();
    let mut meta = BinaryWriter::new(byte_order);
    if format >= 7 {
        meta.write_cstring(&file.unity_version);
    }
    if format >= 8 {
        meta.write_i32(file.target_platform);
    }
    if format >= 13 {
        meta.write_bool(file.enable_type_tree);
    }
    meta.write_bytes(&file.types_section);
    if (7..14).contains(&format) {
        meta.write_i32(file.big_id_enabled);
    }
    meta.write_i32(infos.len() as i32);
    for info in &infos {
        write_object_info(&mut meta, header_size, format, file.big_id_enabled != 0, info);
    }
    meta.write_bytes(&file.tail_section);

    let metadata = meta.into_inner();
    let mut data_offset = header_size + metadata.len();
    data_offset = data_offset.div_ceil(16) * 16;
    if data_offset < 0x1000 {
        data_offset = 0x1000;
    }
    let data = data.into_inner();

    let header = SerializedFileHeader {
        metadata_size: metadata.len() as u32,
        file_size: (data_offset + data.len()) as u64,
        data_offset: data_offset as u64,
        ..file.header.clone()
    };

    let mut out = BinaryWriter::new(byte_order);
    header.write(&mut out);
    out.write_bytes(&metadata);
    out.pad_to(data_offset);
    out.write_bytes(&data);
    Ok(out.into_inner())
}

/// Alignment inside the table is relative to the file start, so the
/// metadata buffer is padded as if it followed the header.
fn write_object_info(
    meta: &mut BinaryWriter,
    header_size: usize,
    format: u32,
    big_id_enabled: bool,
    info: &ObjectInfo,
) {
    if big_id_enabled {
        meta.write_i64(info.path_id);
    } else if format < 14 {
        meta.write_i32(info.path_id as i32);
    } else {
        let absolute = header_size + meta.position();
        meta.pad_to(meta.position() + (4 - absolute % 4) % 4);
        meta.write_i64(info.path_id);
    }
    if format >= 22 {
        meta.write_i64(info.byte_start as i64);
    } else {
        meta.write_u32(info.byte_start as u32);
    }
    meta.write_u32(info.byte_size);
    meta.write_i32(info.type_id);
    if let Some(class_id) = info.legacy_class_id {
        meta.write_u16(class_id);
    }
    if let Some(destroyed) = info.is_destroyed {
        meta.write_u16(destroyed);
    }
    if let Some(index) = info.script_type_index {
        meta.write_i16(index);
    }
    if let Some(stripped) = info.stripped {
        meta.write_u8(stripped);
    }
}
