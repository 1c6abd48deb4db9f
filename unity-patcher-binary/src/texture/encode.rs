//! Images to texel data
//!
//! BC1 to BC5 targets go through `texpresso`. Every other target is written
//! as a plain format: the closest of Alpha8, R8, RGB24, ARGB32, BGRA32 or
//! RGBA32.

use super::formats::{CompressionQuality, TextureFormat};
use crate::error::Result;
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Encoded texel data of one or more mip levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTexture {
    pub data: Vec<u8>,
    pub format: TextureFormat,
    pub mip_count: u32,
}

impl From<CompressionQuality> for texpresso::Algorithm {
    fn from(quality: CompressionQuality) -> Self {
        match quality {
            CompressionQuality::Fast => texpresso::Algorithm::RangeFit,
            CompressionQuality::Balanced => texpresso::Algorithm::ClusterFit,
            CompressionQuality::Best => texpresso::Algorithm::IterativeClusterFit,
        }
    }
}

fn bc_target(format: TextureFormat) -> Option<(texpresso::Format, TextureFormat)> {
    use TextureFormat::*;
    match format {
        DXT1 | DXT1Crunched => Some((texpresso::Format::Bc1, DXT1)),
        DXT3 => Some((texpresso::Format::Bc2, DXT3)),
        DXT5 | DXT5Crunched | BC7 => Some((texpresso::Format::Bc3, DXT5)),
        BC4 => Some((texpresso::Format::Bc4, BC4)),
        BC5 => Some((texpresso::Format::Bc5, BC5)),
        _ => None,
    }
}

/// Encode one level. `image` is top-down; the output is bottom-up.
///
/// Block compression is skipped when `raw` is set or when a side is not a
/// multiple of four.
pub fn encode_level(
    image: &RgbaImage,
    target: TextureFormat,
    quality: CompressionQuality,
    raw: bool,
) -> Result<(Vec<u8>, TextureFormat)> {
    let flipped = imageops::flip_vertical(image);
    let block_friendly = flipped.width() % 4 == 0 && flipped.height() % 4 == 0;

    match bc_target(target) {
        Some((encoder, format)) if !raw && block_friendly => {
            let (w, h) = (flipped.width() as usize, flipped.height() as usize);
            let mut output = vec![0u8; encoder.compressed_size(w, h)];
            let params = texpresso::Params {
                algorithm: quality.into(),
                ..Default::default()
            };
            encoder.compress(flipped.as_raw(), w, h, params, &mut output);
            Ok((output, format))
        }
        _ => Ok(encode_plain(&flipped, target)),
    }
}

fn encode_plain(image: &RgbaImage, target: TextureFormat) -> (Vec<u8>, TextureFormat) {
    use TextureFormat::*;
    let pixels = image.pixels();
    match target {
        Alpha8 => (pixels.map(|p| p.0[3]).collect(), Alpha8),
        R8 | R16 | RHalf | RFloat | EAC_R | EAC_R_SIGNED => (pixels.map(|p| p.0[0]).collect(), R8),
        RGB565 | RGB24 | RGB9e5Float | PVRTC_RGB2 | PVRTC_RGB4 | ATC_RGB4 => (
            pixels.flat_map(|p| [p.0[0], p.0[1], p.0[2]]).collect(),
            RGB24,
        ),
        ARGB32 => (
            pixels.flat_map(|p| [p.0[3], p.0[0], p.0[1], p.0[2]]).collect(),
            ARGB32,
        ),
        BGRA32 => (
            pixels.flat_map(|p| [p.0[2], p.0[1], p.0[0], p.0[3]]).collect(),
            BGRA32,
        ),
        RGBA32 => (image.as_raw().clone(), RGBA32),
        other => {
            tracing::warn!("No encoder for {:?}, writing RGBA32 instead", other);
            (image.as_raw().clone(), RGBA32)
        }
    }
}

/// Encode the base level and up to `mip_count - 1` halved levels.
///
/// Mip generation stops before a side would drop below four pixels; the
/// returned count is the number of levels actually written.
pub fn encode_texture(
    image: &RgbaImage,
    target: TextureFormat,
    quality: CompressionQuality,
    raw: bool,
    mip_count: u32,
) -> Result<EncodedTexture> {
    let (mut data, format) = encode_level(image, target, quality, raw)?;
    let mut levels = 1;

    let (mut width, mut height) = image.dimensions();
    let mut current = image.clone();
    while levels < mip_count {
        width /= 2;
        height /= 2;
        if width < 4 || height < 4 {
            break;
        }
        current = imageops::resize(&current, width, height, FilterType::Triangle);
        let (level, _) = encode_level(&current, target, quality, raw)?;
        data.extend_from_slice(&level);
        levels += 1;
    }

    Ok(EncodedTexture {
        data,
        format,
        mip_count: levels,
    })
}
