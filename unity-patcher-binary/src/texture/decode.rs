//! Texel data to RGBA images
//!
//! Unity stores rows bottom-up; decoded images are flipped so they read
//! top-down like any other image file.

use super::formats::TextureFormat;
use crate::error::{BinaryError, Result};
use crate::unity_version::UnityVersion;
use image::{RgbaImage, imageops};

/// Decode the first mip level of `data`
pub fn decode_image(
    data: &[u8],
    width: u32,
    height: u32,
    format: TextureFormat,
    version: &UnityVersion,
) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(BinaryError::invalid_data(format!(
            "Invalid texture size {}x{}",
            width, height
        )));
    }
    if let Some(expected) = format.calculate_data_size(width, height) {
        if data.len() < expected {
            return Err(BinaryError::not_enough_data(expected, data.len()));
        }
    }

    let rgba = match format {
        TextureFormat::Alpha8
        | TextureFormat::R8
        | TextureFormat::R16
        | TextureFormat::RG16
        | TextureFormat::RGB24
        | TextureFormat::RGBA32
        | TextureFormat::ARGB32
        | TextureFormat::BGRA32
        | TextureFormat::RGB565
        | TextureFormat::RGBA4444
        | TextureFormat::ARGB4444 => decode_plain(data, width, height, format)?,
        _ => decode_blocks(data, width, height, format, version)?,
    };

    let image = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| BinaryError::invalid_data("Decoded pixel count does not match size"))?;
    Ok(imageops::flip_vertical(&image))
}

fn decode_plain(data: &[u8], width: u32, height: u32, format: TextureFormat) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let mut out = Vec::with_capacity(pixels * 4);
    let u16_at = |i: usize| u16::from_le_bytes([data[i * 2], data[i * 2 + 1]]);

    for i in 0..pixels {
        let px = match format {
            TextureFormat::Alpha8 => [255, 255, 255, data[i]],
            TextureFormat::R8 => [data[i], 0, 0, 255],
            TextureFormat::R16 => [(u16_at(i) >> 8) as u8, 0, 0, 255],
            TextureFormat::RG16 => [data[i * 2], data[i * 2 + 1], 0, 255],
            TextureFormat::RGB24 => [data[i * 3], data[i * 3 + 1], data[i * 3 + 2], 255],
            TextureFormat::RGBA32 => [data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]],
            TextureFormat::ARGB32 => [data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3], data[i * 4]],
            TextureFormat::BGRA32 => [data[i * 4 + 2], data[i * 4 + 1], data[i * 4], data[i * 4 + 3]],
            TextureFormat::RGB565 => {
                let v = u16_at(i);
                [
                    expand_bits((v >> 11) & 0x1F, 5),
                    expand_bits((v >> 5) & 0x3F, 6),
                    expand_bits(v & 0x1F, 5),
                    255,
                ]
            }
            TextureFormat::RGBA4444 => {
                let v = u16_at(i);
                [nibble(v >> 12), nibble(v >> 8), nibble(v >> 4), nibble(v)]
            }
            TextureFormat::ARGB4444 => {
                let v = u16_at(i);
                [nibble(v >> 8), nibble(v >> 4), nibble(v), nibble(v >> 12)]
            }
            other => {
                return Err(BinaryError::unsupported(format!(
                    "Texture format {:?} is not a plain format",
                    other
                )));
            }
        };
        out.extend_from_slice(&px);
    }
    Ok(out)
}

fn nibble(v: u16) -> u8 {
    (v & 0xF) as u8 * 17
}

fn expand_bits(v: u16, bits: u32) -> u8 {
    ((v as u32 * 255 + ((1 << bits) - 1) / 2) / ((1 << bits) - 1)) as u8
}

fn decode_blocks(
    data: &[u8],
    width: u32,
    height: u32,
    format: TextureFormat,
    version: &UnityVersion,
) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let mut buffer = vec![0u32; w * h];

    let result = match format {
        TextureFormat::DXT1 => texture2ddecoder::decode_bc1(data, w, h, &mut buffer),
        TextureFormat::DXT5 => texture2ddecoder::decode_bc3(data, w, h, &mut buffer),
        TextureFormat::BC4 => texture2ddecoder::decode_bc4(data, w, h, &mut buffer),
        TextureFormat::BC5 => texture2ddecoder::decode_bc5(data, w, h, &mut buffer),
        TextureFormat::BC7 => texture2ddecoder::decode_bc7(data, w, h, &mut buffer),
        TextureFormat::ETC_RGB4 | TextureFormat::ETC_RGB4_3DS => {
            texture2ddecoder::decode_etc1(data, w, h, &mut buffer)
        }
        TextureFormat::ETC2_RGB => texture2ddecoder::decode_etc2_rgb(data, w, h, &mut buffer),
        TextureFormat::ETC2_RGBA8 | TextureFormat::ETC_RGBA8_3DS => {
            texture2ddecoder::decode_etc2_rgba8(data, w, h, &mut buffer)
        }
        f if f.astc_block().is_some() => match f.astc_block() {
            Some((bw, bh)) => texture2ddecoder::decode_astc(data, w, h, bw, bh, &mut buffer),
            None => Ok(()),
        },
        f if f.is_crunch_compressed() => {
            if version.at_least(2017, 3)
                || matches!(
                    f,
                    TextureFormat::ETC_RGB4Crunched | TextureFormat::ETC2_RGBA8Crunched
                )
            {
                texture2ddecoder::decode_unity_crunch(data, w, h, &mut buffer)
            } else {
                texture2ddecoder::decode_crunch(data, w, h, &mut buffer)
            }
        }
        other => {
            return Err(BinaryError::unsupported(format!(
                "Decoding {:?} textures is not supported",
                other
            )));
        }
    };
    result.map_err(|e| {
        BinaryError::decompression_failed(format!("{:?} decode failed: {}", format, e))
    })?;

    // texture2ddecoder packs pixels as BGRA
    Ok(buffer
        .iter()
        .flat_map(|&pixel| {
            [
                ((pixel >> 16) & 0xFF) as u8,
                ((pixel >> 8) & 0xFF) as u8,
                (pixel & 0xFF) as u8,
                ((pixel >> 24) & 0xFF) as u8,
            ]
        })
        .collect())
}
