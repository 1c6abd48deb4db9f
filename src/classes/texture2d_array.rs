use super::texture2d::empty_stream_data;
use super::{BaseManager, ManagerKind, ObjectManager, int_field, save_png, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_binary::texture::{decode_image, encode_texture, graphics_to_texture, texture_to_graphics};
use unity_patcher_core::UnityValue;

/// Layered textures, one PNG per layer
pub struct Texture2DArrayManager {
    base: BaseManager,
}

/// Declared shape of the array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArrayShape {
    pub width: u32,
    pub height: u32,
    pub depth: usize,
}

impl ArrayShape {
    fn from_tree(tree: &UnityValue) -> Self {
        Self {
            width: int_field(tree, "m_Width") as u32,
            height: int_field(tree, "m_Height") as u32,
            depth: int_field(tree, "m_Depth").max(0) as usize,
        }
    }

    /// Reject layer sets that don't fit the declared depth and size
    pub(crate) fn validate(&self, images: &[RgbaImage]) -> Result<()> {
        if images.len() != self.depth {
            return Err(PatcherError::import(format!(
                "Incorrect number of images. Expected {}, got {}",
                self.depth,
                images.len()
            )));
        }
        for (index, image) in images.iter().enumerate() {
            let (width, height) = image.dimensions();
            if (width, height) != (self.width, self.height) {
                return Err(PatcherError::import(format!(
                    "Incorrect image size. Expected {}x{}, got {}x{} (index: {})",
                    self.width, self.height, width, height, index
                )));
            }
        }
        Ok(())
    }
}

impl Texture2DArrayManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }

    fn image_bytes(&mut self) -> Result<Vec<u8>> {
        let tree = self.base.tree()?.clone();
        match tree.get("image data").and_then(UnityValue::to_bytes) {
            Some(data) if !data.is_empty() => Ok(data),
            _ => {
                let streamed = match tree.get("m_StreamData") {
                    Some(stream) => self.base.read_stream(stream)?,
                    None => None,
                };
                streamed.ok_or_else(|| {
                    PatcherError::export(format!("{} has no readable image data", self.base.name()))
                })
            }
        }
    }
}

impl ObjectManager for Texture2DArrayManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::Texture2DArray
    }

    fn export(&mut self, _dir: Option<&Path>) -> Result<()> {
        let tree = self.base.tree()?.clone();
        let shape = ArrayShape::from_tree(&tree);
        let graphics = int_field(&tree, "m_Format") as i32;
        let format = graphics_to_texture(graphics)
            .ok_or_else(|| PatcherError::unsupported(format!("GraphicsFormat {} not supported yet", graphics)))?;
        if shape.depth == 0 {
            return Ok(());
        }

        let data = self.image_bytes()?;
        let layer_size = data.len() / shape.depth;
        let version = self.base.unity_version();
        let dir = self
            .base
            .base_dest(Some(self.base.type_name()), Some(self.base.name()));
        for (index, layer) in data.chunks(layer_size.max(1)).take(shape.depth).enumerate() {
            let image = decode_image(layer, shape.width, shape.height, format, &version)?;
            let dest = self
                .base
                .indexed_destination(self.base.name(), Some(index as u32), ".png", Some(&dir));
            save_png(&dest, &image)?;
        }
        Ok(())
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        self.import_layers(&[file.to_path_buf()])
    }

    fn import_layers(&mut self, files: &[PathBuf]) -> Result<()> {
        let mut tree = self.base.tree()?.clone();
        let shape = ArrayShape::from_tree(&tree);
        let graphics = int_field(&tree, "m_Format") as i32;
        let target = graphics_to_texture(graphics)
            .ok_or_else(|| PatcherError::import(format!("GraphicsFormat {} not supported yet", graphics)))?;
        if files.len() != shape.depth {
            return Err(PatcherError::import(format!(
                "Incorrect number of images. Expected {}, got {}",
                shape.depth,
                files.len()
            )));
        }

        let images = files
            .iter()
            .map(|file| Ok(image::open(file)?.to_rgba8()))
            .collect::<Result<Vec<_>>>()?;
        shape.validate(&images)?;

        let settings = self.base.settings();
        let quality = settings.texture_compression_quality;
        let raw = settings.dont_compress_texture;
        let mip_count = if settings.generate_mipmaps {
            int_field(&tree, "m_MipCount").max(1) as u32
        } else {
            1
        };

        let mut data = Vec::new();
        let mut written = (target, 1);
        for (index, image) in images.iter().enumerate() {
            let encoded = encode_texture(image, target, quality, raw, mip_count)?;
            data.extend_from_slice(&encoded.data);
            written = (encoded.format, encoded.mip_count);
            tracing::info!("Packing progress: {}/{}", index + 1, shape.depth);
        }

        let (format, levels) = written;
        tree.insert("m_Format", texture_to_graphics(format).unwrap_or(graphics));
        tree.insert("m_MipCount", levels);
        tree.insert("m_DataSize", data.len());
        tree.insert("image data", data);
        if tree.contains_key("m_StreamData") {
            tree.insert("m_StreamData", empty_stream_data());
        }
        self.base.write_tree(tree)
    }

    fn raw_content(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.image_bytes()?))
    }

    fn import_raw_content(&mut self, file: &Path) -> Result<()> {
        let data = std::fs::read(file)?;
        let mut tree = self.base.tree()?.clone();
        tree.insert("m_DataSize", data.len());
        tree.insert("image data", data);
        if tree.contains_key("m_StreamData") {
            tree.insert("m_StreamData", empty_stream_data());
        }
        self.base.write_tree(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> ArrayShape {
        ArrayShape {
            width: 4,
            height: 4,
            depth: 2,
        }
    }

    #[test]
    fn test_validate_count() {
        let err = shape().validate(&[RgbaImage::new(4, 4)]).unwrap_err();
        assert_eq!(err.to_string(), "Incorrect number of images. Expected 2, got 1");
    }

    #[test]
    fn test_validate_size_reports_index() {
        let images = vec![RgbaImage::new(4, 4), RgbaImage::new(8, 4)];
        let err = shape().validate(&images).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Incorrect image size. Expected 4x4, got 8x4 (index: 1)"
        );
    }

    #[test]
    fn test_validate_ok() {
        let images = vec![RgbaImage::new(4, 4), RgbaImage::new(4, 4)];
        assert!(shape().validate(&images).is_ok());
    }
}
