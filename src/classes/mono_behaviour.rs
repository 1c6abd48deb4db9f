use super::{BaseManager, ManagerKind, ObjectManager, str_field};
use crate::context::Context;
use crate::dump_codec;
use crate::error::{PatcherError, Result};
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::{ObjectHandle, ScriptInfo};

/// Script-backed objects as JSON field trees.
///
/// Objects from files without embedded type trees are decoded with the
/// layout the [`TypeTreeManager`](crate::typetree_manager::TypeTreeManager)
/// provides for their script.
pub struct MonoBehaviourManager {
    base: BaseManager,
    script: Option<ScriptInfo>,
}

/// Collapse whitespace runs into single spaces
fn collapse_whitespace(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// File stem of an exported script object: `name @Script`
pub fn export_stem(name: &str, script: Option<&str>) -> String {
    let name = name.replace('@', "-");
    match script {
        Some(script) if !script.is_empty() => format!("{} @{}", name, script),
        _ => name,
    }
}

impl MonoBehaviourManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let script = object.script();
        let mut base = BaseManager::new(object, ctx);
        if base.object.type_tree().is_none() {
            let script = script.as_ref().ok_or_else(|| {
                PatcherError::not_found(format!("Script of #{} can't be resolved", base.path_id()))
            })?;
            let nodes = base.ctx.type_trees.get_nodes(script, &base.unity_version())?;
            base.set_nodes(nodes);
        }

        let mut name = str_field(base.tree()?, "m_Name")
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        if name.is_none() {
            name = base
                .follow("m_GameObject")
                .ok()
                .and_then(|object| object.peek_name())
                .map(|name| collapse_whitespace(&name));
        }
        base.set_name(name.as_deref());
        Ok(Self { base, script })
    }
}

impl ObjectManager for MonoBehaviourManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::MonoBehaviour
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        let stem = export_stem(self.base.name(), self.script_name().as_deref());
        let tree = self.base.tree()?.clone();
        let dest = self.base.destination(&stem, ".json", dir);
        dump_codec::write_dump(&dest, &tree)
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        self.base.import_dump(file)
    }

    fn script_name(&self) -> Option<String> {
        self.script.as_ref().map(|script| script.class_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_stem() {
        assert_eq!(export_stem("Player", Some("PlayerController")), "Player @PlayerController");
        assert_eq!(export_stem("a@b", Some("Quest")), "a-b @Quest");
        assert_eq!(export_stem("Lonely", None), "Lonely");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Main \t Camera\n"), "Main Camera");
    }
}
