use super::{BaseManager, ManagerKind, ObjectManager};
use crate::context::Context;
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_core::UnityValue;

/// Field tree dumps for classes without a dedicated manager
pub struct DefaultManager {
    base: BaseManager,
}

impl DefaultManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Self {
        let mut base = BaseManager::new(object, ctx);
        let name = match base.tree() {
            Ok(tree) => tree.get("m_Name").and_then(UnityValue::as_str).map(str::to_string),
            Err(_) => base.object.peek_name(),
        };
        base.set_name(name.as_deref());
        Self { base }
    }
}

impl ObjectManager for DefaultManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::Default
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        self.base.export_dump(dir)
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        self.base.import_dump(file)
    }
}
