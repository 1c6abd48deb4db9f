use super::sprite::render;
use super::{BaseManager, ManagerKind, ObjectManager, save_png, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_core::UnityValue;

/// Packed sprites of an atlas, one PNG each
pub struct SpriteAtlasManager {
    base: BaseManager,
}

/// Pair each packed sprite with its name
pub fn packed_sprites(tree: &UnityValue) -> Result<Vec<(UnityValue, String)>> {
    let sprites = tree
        .get("m_PackedSprites")
        .and_then(UnityValue::as_array)
        .cloned()
        .unwrap_or_default();
    let names = tree
        .get("m_PackedSpriteNamesToIndex")
        .and_then(UnityValue::as_array)
        .cloned()
        .unwrap_or_default();
    if sprites.len() != names.len() {
        return Err(PatcherError::export("Number of elements mismatch"));
    }
    Ok(sprites
        .into_iter()
        .zip(names)
        .map(|(sprite, name)| (sprite, name.as_str().unwrap_or_default().to_string()))
        .collect())
}

impl SpriteAtlasManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }

    /// Cut one sprite using the atlas render data entry matching its key
    fn sprite_image(&self, tree: &UnityValue, sprite_ref: &UnityValue) -> Result<RgbaImage> {
        let sprite = self.base.follow_value(sprite_ref, "m_PackedSprites")?;
        let fields = sprite.read_fields()?;
        let key = fields
            .get("m_RenderDataKey")
            .ok_or_else(|| PatcherError::export("Sprite has no render data key"))?;
        let entry = tree
            .get("m_RenderDataMap")
            .and_then(UnityValue::as_array)
            .and_then(|map| {
                map.iter().find_map(|pair| {
                    let pair = pair.as_array()?;
                    (pair.first()? == key).then(|| pair.get(1)).flatten()
                })
            })
            .ok_or_else(|| PatcherError::not_found("Render data of the sprite is not in the atlas"))?;
        let texture = entry.get("texture").cloned().unwrap_or_default();
        let rect = entry.get("textureRect").cloned().unwrap_or_default();
        render(&self.base, &texture, &rect)
    }
}

impl ObjectManager for SpriteAtlasManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::SpriteAtlas
    }

    fn export(&mut self, _dir: Option<&Path>) -> Result<()> {
        let tree = self.base.tree()?.clone();
        let sprites = packed_sprites(&tree)?;
        let dir = self
            .base
            .base_dest(Some(self.base.type_name()), Some(self.base.name()));
        for (index, (sprite_ref, sprite_name)) in sprites.iter().enumerate() {
            match self.sprite_image(&tree, sprite_ref) {
                Ok(image) => {
                    let dest = self.base.destination(sprite_name, ".png", Some(&dir));
                    save_png(&dest, &image)?;
                }
                Err(e) => tracing::error!(
                    "[ERR] Failed to read image in {}: {} #{}, index: {} ({})",
                    self.base.type_name(),
                    self.base.name(),
                    self.base.path_id(),
                    index,
                    e
                ),
            }
        }
        Ok(())
    }

    fn import(&mut self, _file: &Path) -> Result<()> {
        Err(PatcherError::unsupported("Import is not supported"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn atlas(sprites: usize, names: &[&str]) -> UnityValue {
        let mut tree = IndexMap::new();
        tree.insert(
            "m_PackedSprites".to_string(),
            UnityValue::Array(vec![UnityValue::object(); sprites]),
        );
        tree.insert(
            "m_PackedSpriteNamesToIndex".to_string(),
            UnityValue::Array(names.iter().map(|n| UnityValue::from(*n)).collect()),
        );
        UnityValue::Object(tree)
    }

    #[test]
    fn test_packed_sprites_length_check() {
        let err = packed_sprites(&atlas(3, &["a", "b"])).unwrap_err();
        assert_eq!(err.to_string(), "Number of elements mismatch");
    }

    #[test]
    fn test_packed_sprites_names() {
        let sprites = packed_sprites(&atlas(2, &["sword", "shield"])).unwrap();
        let names: Vec<_> = sprites.iter().map(|(_, name)| name.as_str()).collect();
        assert_eq!(names, ["sword", "shield"]);
    }
}
