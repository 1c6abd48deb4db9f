use super::{AudioClipManager, BaseManager, ManagerKind, ObjectManager, save_file, str_field};
use crate::context::Context;
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_core::UnityValue;

/// Legacy movie textures: movie bytes plus the sound track clip
pub struct MovieTextureManager {
    base: BaseManager,
}

impl MovieTextureManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }
}

impl ObjectManager for MovieTextureManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::MovieTexture
    }

    fn export(&mut self, _dir: Option<&Path>) -> Result<()> {
        let dir = self.base.base_dest(None, Some(self.base.name()));
        match self.base.follow("m_AudioClip") {
            Ok(clip) => AudioClipManager::new(clip, self.base.ctx.clone())?.export(Some(&dir))?,
            Err(e) => tracing::debug!("{} has no sound track: {}", self.base.name(), e),
        }
        let data = self
            .base
            .tree()?
            .get("m_MovieData")
            .and_then(UnityValue::to_bytes)
            .unwrap_or_default();
        let dest = self.base.destination(self.base.name(), ".bin", Some(&dir));
        save_file(&dest, &data)
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        let data = std::fs::read(file)?;
        let mut tree = self.base.tree()?.clone();
        tree.insert("m_MovieData", data);
        self.base.write_tree(tree)
    }
}
