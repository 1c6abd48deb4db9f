use super::mesh::TEXT_EXPORT_SINCE;
use super::{BaseManager, ManagerKind, ObjectManager, save_file, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_core::UnityValue;

/// Shader source, or a ShaderLab outline of the parsed form when the
/// source isn't shipped
pub fn shader_text(tree: &UnityValue) -> Option<String> {
    if let Some(script) = tree.get("m_Script").and_then(UnityValue::to_bytes) {
        if !script.is_empty() {
            return Some(String::from_utf8_lossy(&script).into_owned());
        }
    }
    let parsed = tree.get("m_ParsedForm")?;
    let name = parsed
        .get("m_Name")
        .and_then(UnityValue::as_str)
        .or_else(|| tree.get("m_Name").and_then(UnityValue::as_str))
        .unwrap_or("Unnamed");

    let mut text = String::new();
    let _ = writeln!(text, "Shader \"{}\" {{", name);
    let props = parsed
        .path(&["m_PropInfo", "m_Props"])
        .and_then(UnityValue::as_array);
    if let Some(props) = props {
        let _ = writeln!(text, "Properties {{");
        for prop in props {
            let prop_name = prop.get("m_Name").and_then(UnityValue::as_str).unwrap_or_default();
            let description = prop
                .get("m_Description")
                .and_then(UnityValue::as_str)
                .unwrap_or_default();
            let _ = writeln!(text, " {} (\"{}\")", prop_name, description);
        }
        let _ = writeln!(text, "}}");
    }
    let _ = writeln!(text, "}}");
    Some(text)
}

pub struct ShaderManager {
    base: BaseManager,
}

impl ShaderManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let tree = base.tree()?;
        let name = str_field(tree, "m_Name")
            .or_else(|| tree.path(&["m_ParsedForm", "m_Name"]).and_then(UnityValue::as_str))
            .map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }
}

impl ObjectManager for ShaderManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::Shader
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        if self.base.unity_version().major < TEXT_EXPORT_SINCE {
            return self.base.export_dump(dir);
        }
        let Some(text) = shader_text(self.base.tree()?) else {
            return self.base.export_dump(dir);
        };
        let dest = self.base.destination(self.base.name(), ".txt", dir);
        save_file(&dest, text.as_bytes())
    }

    fn import(&mut self, _file: &Path) -> Result<()> {
        Err(PatcherError::unsupported("Import is not supported"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn object(fields: Vec<(&str, UnityValue)>) -> UnityValue {
        UnityValue::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<IndexMap<_, _>>(),
        )
    }

    #[test]
    fn test_shader_text_prefers_source() {
        let tree = object(vec![("m_Script", UnityValue::from("Shader \"A\" {}"))]);
        assert_eq!(shader_text(&tree).as_deref(), Some("Shader \"A\" {}"));
    }

    #[test]
    fn test_shader_text_outline() {
        let prop = object(vec![
            ("m_Name", UnityValue::from("_MainTex")),
            ("m_Description", UnityValue::from("Albedo")),
        ]);
        let parsed = object(vec![
            ("m_Name", UnityValue::from("Custom/Water")),
            (
                "m_PropInfo",
                object(vec![("m_Props", UnityValue::Array(vec![prop]))]),
            ),
        ]);
        let tree = object(vec![("m_ParsedForm", parsed)]);
        let text = shader_text(&tree).unwrap();
        assert!(text.starts_with("Shader \"Custom/Water\" {"));
        assert!(text.contains(" _MainTex (\"Albedo\")"));
    }

    #[test]
    fn test_shader_text_without_data() {
        assert_eq!(shader_text(&UnityValue::object()), None);
    }
}
