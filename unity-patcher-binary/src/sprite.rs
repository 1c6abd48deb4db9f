//! Sprite cropping

use crate::error::{BinaryError, Result};
use image::{RgbaImage, imageops};

/// Sprite rectangle in texture space, origin at the bottom left
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpriteRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SpriteRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

/// Cut the sprite out of a decoded, top-down texture image
pub fn crop_sprite(texture: &RgbaImage, rect: SpriteRect) -> Result<RgbaImage> {
    let (texture_width, texture_height) = texture.dimensions();
    if rect.x < 0.0
        || rect.y < 0.0
        || rect.width < 1.0
        || rect.height < 1.0
        || rect.x + rect.width > texture_width as f32
        || rect.y + rect.height > texture_height as f32
    {
        return Err(BinaryError::invalid_data(format!(
            "Sprite rect {:?} is outside the {}x{} texture",
            rect, texture_width, texture_height
        )));
    }

    let x = rect.x.round() as u32;
    let y = rect.y.round() as u32;
    let width = (rect.width.round() as u32).min(texture_width - x);
    let height = (rect.height.round() as u32).min(texture_height - y);

    // Unity rects grow upwards from the bottom edge
    let top = texture_height - y - height;
    Ok(imageops::crop_imm(texture, x, top, width, height).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_crop_uses_bottom_left_origin() {
        // top half red, bottom half green
        let texture = RgbaImage::from_fn(4, 4, |_, y| {
            if y < 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 255, 0, 255])
            }
        });
        let bottom = crop_sprite(&texture, SpriteRect::new(0.0, 0.0, 4.0, 2.0)).unwrap();
        assert_eq!(bottom.dimensions(), (4, 2));
        assert_eq!(bottom.get_pixel(0, 0).0, [0, 255, 0, 255]);

        let top = crop_sprite(&texture, SpriteRect::new(1.0, 2.0, 2.0, 2.0)).unwrap();
        assert_eq!(top.get_pixel(1, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_crop_rejects_out_of_bounds() {
        let texture = RgbaImage::new(4, 4);
        assert!(crop_sprite(&texture, SpriteRect::new(2.0, 0.0, 4.0, 4.0)).is_err());
    }
}
