//! Texture format definitions
//!
//! Values match Unity's `TextureFormat` and `GraphicsFormat` enums.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{BinaryError, Result};

/// Unity texture formats
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(i32)]
pub enum TextureFormat {
    Alpha8 = 1,
    ARGB4444 = 2,
    RGB24 = 3,
    RGBA32 = 4,
    ARGB32 = 5,
    RGB565 = 7,
    R16 = 9,
    DXT1 = 10,
    DXT3 = 11,
    DXT5 = 12,
    RGBA4444 = 13,
    BGRA32 = 14,
    RHalf = 15,
    RGHalf = 16,
    RGBAHalf = 17,
    RFloat = 18,
    RGFloat = 19,
    RGBAFloat = 20,
    YUY2 = 21,
    RGB9e5Float = 22,
    BC6H = 24,
    BC7 = 25,
    BC4 = 26,
    BC5 = 27,
    DXT1Crunched = 28,
    DXT5Crunched = 29,
    PVRTC_RGB2 = 30,
    PVRTC_RGBA2 = 31,
    PVRTC_RGB4 = 32,
    PVRTC_RGBA4 = 33,
    ETC_RGB4 = 34,
    ATC_RGB4 = 35,
    ATC_RGBA8 = 36,
    EAC_R = 41,
    EAC_R_SIGNED = 42,
    EAC_RG = 43,
    EAC_RG_SIGNED = 44,
    ETC2_RGB = 45,
    ETC2_RGBA1 = 46,
    ETC2_RGBA8 = 47,
    ASTC_RGB_4x4 = 48,
    ASTC_RGB_5x5 = 49,
    ASTC_RGB_6x6 = 50,
    ASTC_RGB_8x8 = 51,
    ASTC_RGB_10x10 = 52,
    ASTC_RGB_12x12 = 53,
    ASTC_RGBA_4x4 = 54,
    ASTC_RGBA_5x5 = 55,
    ASTC_RGBA_6x6 = 56,
    ASTC_RGBA_8x8 = 57,
    ASTC_RGBA_10x10 = 58,
    ASTC_RGBA_12x12 = 59,
    ETC_RGB4_3DS = 60,
    ETC_RGBA8_3DS = 61,
    RG16 = 62,
    R8 = 63,
    ETC_RGB4Crunched = 64,
    ETC2_RGBA8Crunched = 65,
    #[default]
    Unknown = -1,
}

const ALL_FORMATS: &[TextureFormat] = &[
    TextureFormat::Alpha8,
    TextureFormat::ARGB4444,
    TextureFormat::RGB24,
    TextureFormat::RGBA32,
    TextureFormat::ARGB32,
    TextureFormat::RGB565,
    TextureFormat::R16,
    TextureFormat::DXT1,
    TextureFormat::DXT3,
    TextureFormat::DXT5,
    TextureFormat::RGBA4444,
    TextureFormat::BGRA32,
    TextureFormat::RHalf,
    TextureFormat::RGHalf,
    TextureFormat::RGBAHalf,
    TextureFormat::RFloat,
    TextureFormat::RGFloat,
    TextureFormat::RGBAFloat,
    TextureFormat::YUY2,
    TextureFormat::RGB9e5Float,
    TextureFormat::BC6H,
    TextureFormat::BC7,
    TextureFormat::BC4,
    TextureFormat::BC5,
    TextureFormat::DXT1Crunched,
    TextureFormat::DXT5Crunched,
    TextureFormat::PVRTC_RGB2,
    TextureFormat::PVRTC_RGBA2,
    TextureFormat::PVRTC_RGB4,
    TextureFormat::PVRTC_RGBA4,
    TextureFormat::ETC_RGB4,
    TextureFormat::ATC_RGB4,
    TextureFormat::ATC_RGBA8,
    TextureFormat::EAC_R,
    TextureFormat::EAC_R_SIGNED,
    TextureFormat::EAC_RG,
    TextureFormat::EAC_RG_SIGNED,
    TextureFormat::ETC2_RGB,
    TextureFormat::ETC2_RGBA1,
    TextureFormat::ETC2_RGBA8,
    TextureFormat::ASTC_RGB_4x4,
    TextureFormat::ASTC_RGB_5x5,
    TextureFormat::ASTC_RGB_6x6,
    TextureFormat::ASTC_RGB_8x8,
    TextureFormat::ASTC_RGB_10x10,
    TextureFormat::ASTC_RGB_12x12,
    TextureFormat::ASTC_RGBA_4x4,
    TextureFormat::ASTC_RGBA_5x5,
    TextureFormat::ASTC_RGBA_6x6,
    TextureFormat::ASTC_RGBA_8x8,
    TextureFormat::ASTC_RGBA_10x10,
    TextureFormat::ASTC_RGBA_12x12,
    TextureFormat::ETC_RGB4_3DS,
    TextureFormat::ETC_RGBA8_3DS,
    TextureFormat::RG16,
    TextureFormat::R8,
    TextureFormat::ETC_RGB4Crunched,
    TextureFormat::ETC2_RGBA8Crunched,
];

impl From<i32> for TextureFormat {
    fn from(value: i32) -> Self {
        ALL_FORMATS
            .iter()
            .copied()
            .find(|format| *format as i32 == value)
            .unwrap_or(TextureFormat::Unknown)
    }
}

impl TextureFormat {
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Byte size of one compressed block, or bytes per pixel for plain formats
    pub fn block_bytes(self) -> Option<(u32, u32, u32)> {
        use TextureFormat::*;
        let info = match self {
            Alpha8 | R8 => (1, 1, 1),
            ARGB4444 | RGBA4444 | RGB565 | R16 | RHalf | RG16 => (1, 1, 2),
            RGB24 => (1, 1, 3),
            RGBA32 | ARGB32 | BGRA32 | RGHalf | RFloat | RGB9e5Float => (1, 1, 4),
            RGBAHalf | RGFloat => (1, 1, 8),
            RGBAFloat => (1, 1, 16),
            DXT1 | DXT1Crunched | BC4 | ETC_RGB4 | ETC_RGB4_3DS | ETC_RGB4Crunched | ETC2_RGB
            | ETC2_RGBA1 | EAC_R | EAC_R_SIGNED | ATC_RGB4 => (4, 4, 8),
            DXT3 | DXT5 | DXT5Crunched | BC5 | BC6H | BC7 | ETC2_RGBA8 | ETC2_RGBA8Crunched
            | ETC_RGBA8_3DS | EAC_RG | EAC_RG_SIGNED | ATC_RGBA8 => (4, 4, 16),
            ASTC_RGB_4x4 | ASTC_RGBA_4x4 => (4, 4, 16),
            ASTC_RGB_5x5 | ASTC_RGBA_5x5 => (5, 5, 16),
            ASTC_RGB_6x6 | ASTC_RGBA_6x6 => (6, 6, 16),
            ASTC_RGB_8x8 | ASTC_RGBA_8x8 => (8, 8, 16),
            ASTC_RGB_10x10 | ASTC_RGBA_10x10 => (10, 10, 16),
            ASTC_RGB_12x12 | ASTC_RGBA_12x12 => (12, 12, 16),
            _ => return None,
        };
        Some(info)
    }

    /// Expected byte size of one mip level; crunched formats have no fixed size
    pub fn calculate_data_size(self, width: u32, height: u32) -> Option<usize> {
        if self.is_crunch_compressed() {
            return None;
        }
        let (bw, bh, bytes) = self.block_bytes()?;
        Some(width.div_ceil(bw) as usize * height.div_ceil(bh) as usize * bytes as usize)
    }

    pub fn is_crunch_compressed(self) -> bool {
        matches!(
            self,
            TextureFormat::DXT1Crunched
                | TextureFormat::DXT5Crunched
                | TextureFormat::ETC_RGB4Crunched
                | TextureFormat::ETC2_RGBA8Crunched
        )
    }

    /// ASTC block dimensions
    pub fn astc_block(self) -> Option<(usize, usize)> {
        use TextureFormat::*;
        match self {
            ASTC_RGB_4x4 | ASTC_RGBA_4x4 => Some((4, 4)),
            ASTC_RGB_5x5 | ASTC_RGBA_5x5 => Some((5, 5)),
            ASTC_RGB_6x6 | ASTC_RGBA_6x6 => Some((6, 6)),
            ASTC_RGB_8x8 | ASTC_RGBA_8x8 => Some((8, 8)),
            ASTC_RGB_10x10 | ASTC_RGBA_10x10 => Some((10, 10)),
            ASTC_RGB_12x12 | ASTC_RGBA_12x12 => Some((12, 12)),
            _ => None,
        }
    }
}

/// `GraphicsFormat` values used by Texture2DArray, mapped to texture formats.
/// Formats outside this table cannot be imported.
const GRAPHICS_TO_TEXTURE: &[(i32, TextureFormat)] = &[
    (3, TextureFormat::RGB24),
    (4, TextureFormat::RGBA32),
    (5, TextureFormat::R8),
    (7, TextureFormat::RGB24),
    (8, TextureFormat::RGBA32),
    (48, TextureFormat::RGBAHalf),
    (52, TextureFormat::RGBAFloat),
    (96, TextureFormat::DXT1),
    (97, TextureFormat::DXT1),
    (98, TextureFormat::DXT3),
    (99, TextureFormat::DXT3),
    (100, TextureFormat::DXT5),
    (101, TextureFormat::DXT5),
    (102, TextureFormat::BC4),
    (104, TextureFormat::BC5),
    (108, TextureFormat::BC7),
    (109, TextureFormat::BC7),
];

pub fn graphics_to_texture(graphics_format: i32) -> Option<TextureFormat> {
    GRAPHICS_TO_TEXTURE
        .iter()
        .find(|(graphics, _)| *graphics == graphics_format)
        .map(|(_, format)| *format)
}

/// First graphics format that maps to `format`
pub fn texture_to_graphics(format: TextureFormat) -> Option<i32> {
    GRAPHICS_TO_TEXTURE
        .iter()
        .find(|(_, texture)| *texture == format)
        .map(|(graphics, _)| *graphics)
}

/// Encoder effort for block-compressed formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionQuality {
    Fast,
    Balanced,
    #[default]
    Best,
}

impl FromStr for CompressionQuality {
    type Err = BinaryError;

    fn from_str(text: &str) -> Result<Self> {
        match text.to_ascii_lowercase().as_str() {
            "fast" => Ok(CompressionQuality::Fast),
            "balanced" | "normal" => Ok(CompressionQuality::Balanced),
            "best" => Ok(CompressionQuality::Best),
            other => Err(BinaryError::invalid_data(format!(
                "Unknown texture quality '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_id() {
        assert_eq!(TextureFormat::from(12), TextureFormat::DXT5);
        assert_eq!(TextureFormat::from(63), TextureFormat::R8);
        assert_eq!(TextureFormat::from(1000), TextureFormat::Unknown);
    }

    #[test]
    fn test_data_size() {
        assert_eq!(TextureFormat::RGBA32.calculate_data_size(4, 4), Some(64));
        assert_eq!(TextureFormat::DXT1.calculate_data_size(8, 8), Some(32));
        assert_eq!(TextureFormat::DXT5.calculate_data_size(6, 6), Some(64));
        assert_eq!(TextureFormat::ASTC_RGBA_6x6.calculate_data_size(12, 12), Some(64));
        assert_eq!(TextureFormat::DXT5Crunched.calculate_data_size(8, 8), None);
    }

    #[test]
    fn test_graphics_format_map() {
        assert_eq!(graphics_to_texture(101), Some(TextureFormat::DXT5));
        assert_eq!(texture_to_graphics(TextureFormat::RGBA32), Some(4));
        assert_eq!(graphics_to_texture(0), None);
    }

    #[test]
    fn test_quality_from_str() {
        assert_eq!("BEST".parse::<CompressionQuality>().unwrap(), CompressionQuality::Best);
        assert!("ultra".parse::<CompressionQuality>().is_err());
    }
}
