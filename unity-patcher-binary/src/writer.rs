//! Binary data writer, the counterpart of [`BinaryReader`](crate::reader::BinaryReader)

use crate::reader::ByteOrder;
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Growable output buffer with Unity alignment helpers
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
    byte_order: ByteOrder,
}

macro_rules! write_number {
    ($name:ident, $ty:ty, $size:expr, $be:expr, $le:expr) => {
        #[doc = concat!("Write a `", stringify!($ty), "` in the current byte order")]
        pub fn $name(&mut self, value: $ty) {
            let mut bytes = [0u8; $size];
            match self.byte_order {
                ByteOrder::Big => $be(&mut bytes, value),
                ByteOrder::Little => $le(&mut bytes, value),
            }
            self.buffer.extend_from_slice(&bytes);
        }
    };
}

impl BinaryWriter {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            buffer: Vec::new(),
            byte_order,
        }
    }

    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Pad with zeros to the next 4-byte boundary
    pub fn align(&mut self) {
        self.align_to(4);
    }

    /// Pad with zeros to the given boundary
    pub fn align_to(&mut self, alignment: usize) {
        let padding = (alignment - self.buffer.len() % alignment) % alignment;
        self.buffer.resize(self.buffer.len() + padding, 0);
    }

    /// Pad with zeros up to an absolute position
    pub fn pad_to(&mut self, position: usize) {
        if self.buffer.len() < position {
            self.buffer.resize(position, 0);
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buffer.push(value as u8);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    write_number!(write_u16, u16, 2, BigEndian::write_u16, LittleEndian::write_u16);
    write_number!(write_i16, i16, 2, BigEndian::write_i16, LittleEndian::write_i16);
    write_number!(write_u32, u32, 4, BigEndian::write_u32, LittleEndian::write_u32);
    write_number!(write_i32, i32, 4, BigEndian::write_i32, LittleEndian::write_i32);
    write_number!(write_u64, u64, 8, BigEndian::write_u64, LittleEndian::write_u64);
    write_number!(write_i64, i64, 8, BigEndian::write_i64, LittleEndian::write_i64);
    write_number!(write_f32, f32, 4, BigEndian::write_f32, LittleEndian::write_f32);
    write_number!(write_f64, f64, 8, BigEndian::write_f64, LittleEndian::write_f64);

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Null-terminated string
    pub fn write_cstring(&mut self, text: &str) {
        self.buffer.extend_from_slice(text.as_bytes());
        self.buffer.push(0);
    }

    /// Overwrite a u32 that was reserved earlier (sizes, offsets)
    pub fn patch_u32(&mut self, position: usize, value: u32) {
        let mut bytes = [0u8; 4];
        match self.byte_order {
            ByteOrder::Big => BigEndian::write_u32(&mut bytes, value),
            ByteOrder::Little => LittleEndian::write_u32(&mut bytes, value),
        }
        self.buffer[position..position + 4].copy_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::BinaryReader;

    #[test]
    fn test_alignment_padding() {
        let mut writer = BinaryWriter::new(ByteOrder::Little);
        writer.write_u8(1);
        writer.align();
        assert_eq!(writer.position(), 4);
        writer.align_to(16);
        assert_eq!(writer.position(), 16);
    }

    #[test]
    fn test_patch_u32_big_endian() {
        let mut writer = BinaryWriter::new(ByteOrder::Big);
        writer.write_u32(0);
        writer.write_cstring("UnityFS");
        writer.patch_u32(0, 0x0102_0304);

        let bytes = writer.into_inner();
        let mut reader = BinaryReader::new(&bytes, ByteOrder::Big);
        assert_eq!(reader.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(reader.read_cstring().unwrap(), "UnityFS");
    }
}
