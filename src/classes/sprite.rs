use super::{BaseManager, ManagerKind, ObjectManager, Texture2DManager, save_png, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_binary::sprite::{SpriteRect, crop_sprite};
use unity_patcher_core::UnityValue;

/// Read a `Rectf` value
pub fn sprite_rect(value: &UnityValue) -> Option<SpriteRect> {
    let float = |key: &str| value.get(key).and_then(UnityValue::as_f64).map(|v| v as f32);
    Some(SpriteRect::new(
        float("x")?,
        float("y")?,
        float("width")?,
        float("height")?,
    ))
}

/// Crop `rect` out of the texture `texture_ref` points at
pub(crate) fn render(base: &BaseManager, texture_ref: &UnityValue, rect: &UnityValue) -> Result<RgbaImage> {
    let rect = sprite_rect(rect)
        .ok_or_else(|| PatcherError::export(format!("{} has no texture rect", base.name())))?;
    let texture = base.follow_value(texture_ref, "texture")?;
    let image = Texture2DManager::new(texture, base.ctx.clone())?
        .image()?
        .ok_or_else(|| PatcherError::export(format!("Texture of {} has no image data", base.name())))?;
    Ok(crop_sprite(&image, rect)?)
}

pub struct SpriteManager {
    base: BaseManager,
}

impl SpriteManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }

    /// The sprite image, cut from its own render data
    pub fn image(&mut self) -> Result<RgbaImage> {
        let tree = self.base.tree()?.clone();
        let render_data = tree
            .get("m_RD")
            .ok_or_else(|| PatcherError::export(format!("{} has no render data", self.base.name())))?;
        let texture = render_data.get("texture").cloned().unwrap_or_default();
        let rect = render_data.get("textureRect").cloned().unwrap_or_default();
        render(&self.base, &texture, &rect)
    }
}

impl ObjectManager for SpriteManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::Sprite
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        let image = self.image()?;
        let dest = self.base.destination(self.base.name(), ".png", dir);
        save_png(&dest, &image)
    }

    fn import(&mut self, _file: &Path) -> Result<()> {
        Err(PatcherError::unsupported("Import is not supported"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_sprite_rect() {
        let mut rect = IndexMap::new();
        for (key, value) in [("x", 2.0), ("y", 4.0), ("width", 16.0), ("height", 8.0)] {
            rect.insert(key.to_string(), UnityValue::Float(value));
        }
        assert_eq!(
            sprite_rect(&UnityValue::Object(rect)),
            Some(SpriteRect::new(2.0, 4.0, 16.0, 8.0))
        );
        assert_eq!(sprite_rect(&UnityValue::object()), None);
    }
}
