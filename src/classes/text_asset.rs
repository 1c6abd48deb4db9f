use super::{BaseManager, ManagerKind, ObjectManager, save_file, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_core::UnityValue;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const EXTENSIONS: &[&str] = &["json", "txt", "bin"];

/// `.json` for valid JSON, `.txt` for other UTF-8 text, `.bin` otherwise
pub fn text_extension(data: &[u8]) -> &'static str {
    let Ok(text) = std::str::from_utf8(data.strip_prefix(UTF8_BOM).unwrap_or(data)) else {
        return ".bin";
    };
    if serde_json::from_str::<serde_json::Value>(text).is_ok() {
        ".json"
    } else {
        ".txt"
    }
}

pub struct TextAssetManager {
    base: BaseManager,
}

impl TextAssetManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }

    fn script(&mut self) -> Result<Vec<u8>> {
        Ok(self
            .base
            .tree()?
            .get("m_Script")
            .and_then(UnityValue::to_bytes)
            .unwrap_or_default())
    }
}

impl ObjectManager for TextAssetManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::TextAsset
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        let data = self.script()?;
        let dest = self.base.destination(self.base.name(), text_extension(&data), dir);
        save_file(&dest, &data)
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        let extension = file
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !EXTENSIONS.contains(&extension.as_str()) {
            return Err(PatcherError::import(format!(
                "Invalid file. Expected json/txt/bin, got {}",
                file.display()
            )));
        }
        let data = std::fs::read(file)?;
        let mut tree = self.base.tree()?.clone();
        tree.insert("m_Script", data);
        self.base.write_tree(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_extension() {
        assert_eq!(text_extension(br#"{"hp": 10}"#), ".json");
        assert_eq!(text_extension(b"\xEF\xBB\xBF[1, 2]"), ".json");
        assert_eq!(text_extension(b"Once upon a time"), ".txt");
        assert_eq!(text_extension(&[0xFF, 0x00, 0x12]), ".bin");
    }
}
