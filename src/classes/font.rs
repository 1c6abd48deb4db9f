use super::{BaseManager, ManagerKind, ObjectManager, Texture2DManager, save_file, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_core::UnityValue;

const OTF_MAGIC: &[u8] = b"OTTO";
const TTF_MAGIC: &[u8] = &[0x00, 0x01, 0x00, 0x00];

/// `m_ConvertCase` of a dynamic font
const DYNAMIC_FONT: i32 = -2;

pub fn font_extension(data: &[u8]) -> &'static str {
    if data.starts_with(OTF_MAGIC) { ".otf" } else { ".ttf" }
}

/// Font files, plus the glyph atlas and field dump of bitmap fonts
pub struct FontManager {
    base: BaseManager,
}

impl FontManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }
}

impl ObjectManager for FontManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::Font
    }

    fn export(&mut self, _dir: Option<&Path>) -> Result<()> {
        let tree = self.base.tree()?.clone();
        let has_rects = tree
            .get("m_CharacterRects")
            .and_then(UnityValue::as_array)
            .is_some_and(|rects| !rects.is_empty());
        let font_data = tree
            .get("m_FontData")
            .and_then(UnityValue::to_bytes)
            .filter(|data| !data.is_empty());
        if !has_rects && font_data.is_none() {
            tracing::warn!(
                "[WARN] {} Font object doesn't contain exportable data.",
                self.base.name()
            );
            return Ok(());
        }

        let dir = self.base.base_dest(None, Some(self.base.name()));
        self.base.export_dump(Some(&dir))?;
        if has_rects {
            let texture = self.base.follow("m_Texture")?;
            Texture2DManager::new(texture, self.base.ctx.clone())?.export(Some(&dir))?;
        }
        if let Some(data) = font_data {
            let dest = self
                .base
                .destination(self.base.name(), font_extension(&data), Some(&dir));
            save_file(&dest, &data)?;
        }
        Ok(())
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        let data = std::fs::read(file)?;
        if !data.starts_with(OTF_MAGIC) && !data.starts_with(TTF_MAGIC) {
            return Err(PatcherError::import(format!(
                "Incorrect font format: {}. Expected ttf/otf",
                file.display()
            )));
        }
        let mut tree = self.base.tree()?.clone();
        tree.insert("m_FontData", data);
        tree.insert("m_CharacterRects", Vec::<UnityValue>::new());
        tree.insert("m_ConvertCase", DYNAMIC_FONT);
        self.base.write_tree(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_extension() {
        assert_eq!(font_extension(b"OTTO\0\x0a"), ".otf");
        assert_eq!(font_extension(&[0, 1, 0, 0, 0, 12]), ".ttf");
    }
}
