use super::{BaseManager, ManagerKind, ObjectManager, save_file, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_binary::mesh::export_obj;
use unity_patcher_core::UnityValue;

/// First engine major version whose meshes are exported as OBJ
pub(crate) const TEXT_EXPORT_SINCE: u32 = 2019;

pub struct MeshManager {
    base: BaseManager,
}

impl MeshManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }

    fn vertex_bytes(&mut self, tree: &UnityValue) -> Result<Vec<u8>> {
        let inline = tree
            .path(&["m_VertexData", "m_DataSize"])
            .and_then(UnityValue::to_bytes)
            .unwrap_or_default();
        if !inline.is_empty() {
            return Ok(inline);
        }
        match tree.get("m_StreamData") {
            Some(stream) => Ok(self.base.read_stream(stream)?.unwrap_or_default()),
            None => Ok(inline),
        }
    }
}

impl ObjectManager for MeshManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::Mesh
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        if self.base.unity_version().major < TEXT_EXPORT_SINCE {
            return self.base.export_dump(dir);
        }
        let tree = self.base.tree()?.clone();
        let vertices = self.vertex_bytes(&tree)?;
        let obj = export_obj(&tree, &vertices, self.base.object.byte_order())?;
        let dest = self.base.destination(self.base.name(), ".obj", dir);
        save_file(&dest, obj.as_bytes())
    }

    fn import(&mut self, _file: &Path) -> Result<()> {
        Err(PatcherError::unsupported("Import is not supported"))
    }
}
