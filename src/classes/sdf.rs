use super::{BaseManager, DefaultManager, ManagerKind, MonoBehaviourManager, ObjectManager, Texture2DManager};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_core::UnityValue;

/// Script class of TextMeshPro font assets
pub const SDF_SCRIPT: &str = "TMP_FontAsset";

/// TextMeshPro font assets: the script dump, its material and its atlases
pub struct SdfManager {
    mono: MonoBehaviourManager,
}

impl SdfManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        Ok(Self {
            mono: MonoBehaviourManager::new(object, ctx)?,
        })
    }

    fn atlas_refs(tree: &UnityValue) -> Vec<UnityValue> {
        match tree.get("m_AtlasTextures").and_then(UnityValue::as_array) {
            Some(atlases) => atlases.clone(),
            None => tree.get("atlas").cloned().into_iter().collect(),
        }
    }
}

impl ObjectManager for SdfManager {
    fn base(&self) -> &BaseManager {
        self.mono.base()
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        self.mono.base_mut()
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::Sdf
    }

    fn export(&mut self, _dir: Option<&Path>) -> Result<()> {
        let base = self.mono.base();
        let dir = base.base_dest(Some("SDF"), Some(base.name()));
        self.mono.export(Some(&dir))?;

        let tree = self.mono.base_mut().tree()?.clone();
        let ctx = self.mono.base().ctx.clone();
        let material_field = if tree.contains_key("material") { "material" } else { "m_Material" };
        let material = self.mono.base_mut().follow(material_field)?;
        DefaultManager::new(material, ctx.clone()).export_dump(Some(&dir))?;

        for (index, atlas) in Self::atlas_refs(&tree).iter().enumerate() {
            let texture = self
                .mono
                .base()
                .follow_value(atlas, &format!("atlas {}", index))?;
            Texture2DManager::new(texture, ctx.clone())?.export(Some(&dir))?;
        }
        Ok(())
    }

    fn import(&mut self, _file: &Path) -> Result<()> {
        Err(PatcherError::unsupported(
            "SDF class doesn't support import. Import atlas and dump separately through the corresponding classes.",
        ))
    }

    fn script_name(&self) -> Option<String> {
        self.mono.script_name()
    }
}
