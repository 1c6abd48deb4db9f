use super::{BaseManager, ManagerKind, ObjectManager, int_field, save_png, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use image::RgbaImage;
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::texture::{decode_image, encode_texture};
use unity_patcher_binary::{ObjectHandle, TextureFormat};
use unity_patcher_core::UnityValue;

const IMAGE_DATA: &str = "image data";

/// Empty `StreamingInfo`: image data lives in the object again
pub(crate) fn empty_stream_data() -> UnityValue {
    let mut stream = IndexMap::new();
    stream.insert("offset".to_string(), UnityValue::Integer(0));
    stream.insert("size".to_string(), UnityValue::Integer(0));
    stream.insert("path".to_string(), UnityValue::String(String::new()));
    UnityValue::Object(stream)
}

/// PNG export and import of single textures
pub struct Texture2DManager {
    base: BaseManager,
}

impl Texture2DManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }

    /// Texel bytes, inline or streamed from a resource file
    fn image_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        let tree = self.base.tree()?.clone();
        if int_field(&tree, "m_CompleteImageSize") <= 0 {
            return Ok(None);
        }
        match tree.get(IMAGE_DATA).and_then(UnityValue::to_bytes) {
            Some(data) if !data.is_empty() => Ok(Some(data)),
            _ => match tree.get("m_StreamData") {
                Some(stream) => self.base.read_stream(stream),
                None => Ok(None),
            },
        }
    }

    /// Decoded first mip level, `None` for textures without image data
    pub fn image(&mut self) -> Result<Option<RgbaImage>> {
        let tree = self.base.tree()?.clone();
        if int_field(&tree, "m_CompleteImageSize") <= 0 {
            return Ok(None);
        }
        let width = int_field(&tree, "m_Width") as u32;
        let height = int_field(&tree, "m_Height") as u32;
        let format = TextureFormat::from(int_field(&tree, "m_TextureFormat") as i32);
        let version = self.base.unity_version();

        let inline = tree
            .get(IMAGE_DATA)
            .and_then(UnityValue::to_bytes)
            .filter(|data| !data.is_empty());
        if let Some(data) = inline {
            match decode_image(&data, width, height, format, &version) {
                Ok(image) => return Ok(Some(image)),
                Err(e) => tracing::debug!("Inline image data of {} unusable: {}", self.base.name(), e),
            }
        }
        let streamed = match tree.get("m_StreamData") {
            Some(stream) => self.base.read_stream(stream)?,
            None => None,
        };
        match streamed {
            Some(data) => Ok(Some(decode_image(&data, width, height, format, &version)?)),
            None => Err(PatcherError::export(format!(
                "{} has no readable image data",
                self.base.name()
            ))),
        }
    }

    fn write_image_data(data: Vec<u8>, tree: &mut UnityValue) {
        tree.insert("m_CompleteImageSize", data.len());
        tree.insert(IMAGE_DATA, data);
        if tree.contains_key("m_StreamData") {
            tree.insert("m_StreamData", empty_stream_data());
        }
    }
}

impl ObjectManager for Texture2DManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::Texture2D
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        let Some(image) = self.image()? else {
            tracing::debug!("{} has no image data, skipped", self.base.name());
            return Ok(());
        };
        let dest = self.base.destination(self.base.name(), ".png", dir);
        save_png(&dest, &image)
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        let settings = self.base.settings();
        let quality = settings.texture_compression_quality;
        let raw = settings.dont_compress_texture;
        let generate_mipmaps = settings.generate_mipmaps;

        let mut tree = self.base.tree()?.clone();
        let mip_count = if generate_mipmaps {
            int_field(&tree, "m_MipCount").max(1) as u32
        } else {
            1
        };
        let target = TextureFormat::from(int_field(&tree, "m_TextureFormat") as i32);

        let image = image::open(file)?.to_rgba8();
        let encoded = encode_texture(&image, target, quality, raw, mip_count)?;

        // Before 5.2 the tree only has a mip map flag
        if tree.contains_key("m_MipMap") {
            tree.insert("m_MipMap", encoded.mip_count > 1);
        } else {
            tree.insert("m_MipCount", encoded.mip_count);
        }
        tree.insert("m_TextureFormat", encoded.format.id());
        tree.insert("m_Width", image.width());
        tree.insert("m_Height", image.height());
        Self::write_image_data(encoded.data, &mut tree);
        self.base.write_tree(tree)
    }

    fn raw_content(&mut self) -> Result<Option<Vec<u8>>> {
        self.image_bytes()
    }

    fn import_raw_content(&mut self, file: &Path) -> Result<()> {
        let data = std::fs::read(file)?;
        let mut tree = self.base.tree()?.clone();
        Self::write_image_data(data, &mut tree);
        self.base.write_tree(tree)
    }
}
