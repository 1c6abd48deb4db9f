//! Binary data reader for Unity files

use crate::error::{BinaryError, Result};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Byte order for reading and writing binary data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Big endian (bundle headers, serialized file headers)
    Big,
    /// Little endian (most object data)
    #[default]
    Little,
}

/// Cursor over a borrowed byte slice
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
    byte_order: ByteOrder,
}

macro_rules! read_number {
    ($name:ident, $ty:ty, $size:expr, $be:expr, $le:expr) => {
        #[doc = concat!("Read a `", stringify!($ty), "` in the current byte order")]
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take($size)?;
            Ok(match self.byte_order {
                ByteOrder::Big => $be(bytes),
                ByteOrder::Little => $le(bytes),
            })
        }
    };
}

impl<'a> BinaryReader<'a> {
    /// Create a new binary reader from byte slice
    pub fn new(data: &'a [u8], byte_order: ByteOrder) -> Self {
        Self {
            data,
            pos: 0,
            byte_order,
        }
    }

    /// Current position in the stream
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute position
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(BinaryError::not_enough_data(pos, self.data.len()));
        }
        self.pos = pos;
        Ok(())
    }

    /// Total length of the data
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the reader is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remaining bytes from current position
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Align to the next 4-byte boundary
    pub fn align(&mut self) -> Result<()> {
        self.align_to(4)
    }

    /// Align to the specified byte boundary
    pub fn align_to(&mut self, alignment: usize) -> Result<()> {
        let aligned = (self.pos + alignment - 1) / alignment * alignment;
        self.set_position(aligned.min(self.data.len()))
    }

    /// Get the current byte order
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Set the byte order
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    /// Borrow the next `count` bytes and advance
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(BinaryError::not_enough_data(count, self.remaining()));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a signed 8-bit integer
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a boolean (as u8, 0 = false, non-zero = true)
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    read_number!(read_u16, u16, 2, BigEndian::read_u16, LittleEndian::read_u16);
    read_number!(read_i16, i16, 2, BigEndian::read_i16, LittleEndian::read_i16);
    read_number!(read_u32, u32, 4, BigEndian::read_u32, LittleEndian::read_u32);
    read_number!(read_i32, i32, 4, BigEndian::read_i32, LittleEndian::read_i32);
    read_number!(read_u64, u64, 8, BigEndian::read_u64, LittleEndian::read_u64);
    read_number!(read_i64, i64, 8, BigEndian::read_i64, LittleEndian::read_i64);
    read_number!(read_f32, f32, 4, BigEndian::read_f32, LittleEndian::read_f32);
    read_number!(read_f64, f64, 8, BigEndian::read_f64, LittleEndian::read_f64);

    /// Read a fixed number of bytes into an owned buffer
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Slice of the data after the current position
    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Read a null-terminated string
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = self.remaining_slice();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| BinaryError::invalid_data("Unterminated string"))?;
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(text)
    }

    /// Read a length-prefixed byte string (32-bit length)
    pub fn read_byte_string(&mut self) -> Result<&'a [u8]> {
        let length = self.read_i32()?;
        if length < 0 {
            return Err(BinaryError::invalid_data(format!(
                "Negative string length: {}",
                length
            )));
        }
        self.take(length as usize)
    }

    /// Read an aligned string (Unity format)
    pub fn read_aligned_string(&mut self) -> Result<String> {
        let bytes = self.read_byte_string()?;
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.align()?;
        Ok(text)
    }
}
