use super::save_file;
use crate::context::Context;
use crate::dump_codec;
use crate::error::Result;
use crate::patch_file::patch_file_name;
use crate::settings::{GroupOption, Settings};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unity_patcher_binary::{ObjectHandle, PPtr, TypeTreeNode, UnityVersion};
use unity_patcher_core::UnityValue;

static ILLEGAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[#<>:"/\\|?*\[\]]"#).expect("valid name regex"));

const CLONE: &str = "(Clone)";

/// Make an object name safe for a patch file name.
///
/// Path separators and the characters used by the patch name pattern
/// become `-`; a run of `n > 1` `(Clone)` suffixes becomes `(Clone)xn`.
pub fn fix_name(name: &str) -> String {
    let fixed = ILLEGAL_CHARS.replace_all(name, "-").into_owned();
    let count = fixed.matches(CLONE).count();
    if count > 1 {
        fixed.replace(&CLONE.repeat(count), &format!("{}x{}", CLONE, count))
    } else {
        fixed
    }
}

/// State and helpers shared by every manager
pub struct BaseManager {
    pub object: ObjectHandle,
    pub ctx: Arc<Context>,
    type_name: String,
    name: String,
    tree: Option<UnityValue>,
    /// Layout used instead of the embedded one (generated script layouts)
    nodes: Option<TypeTreeNode>,
}

impl BaseManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Self {
        let type_name = object.type_name();
        Self {
            name: format!("Unnamed {}", type_name),
            object,
            ctx,
            type_name,
            tree: None,
            nodes: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.ctx.settings
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn path_id(&self) -> i64 {
        self.object.path_id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the display name; empty names fall back to `Unnamed <Type>`
    pub fn set_name(&mut self, name: Option<&str>) {
        self.name = self.fixed_name(name);
    }

    fn fixed_name(&self, name: Option<&str>) -> String {
        match name {
            Some(name) if !name.is_empty() => fix_name(name),
            _ => format!("Unnamed {}", self.type_name),
        }
    }

    pub fn source_name(&self) -> &str {
        self.object.assets_file_name()
    }

    /// Engine version of the object's file, or the configured fallback for
    /// stripped builds
    pub fn unity_version(&self) -> UnityVersion {
        let version = self.object.unity_version();
        if version.is_stripped() {
            self.settings().fallback_unity_version()
        } else {
            version
        }
    }

    /// Bytes of a `StreamingInfo`-like field (`path`, `offset`, `size`)
    pub fn read_stream(&self, stream: &UnityValue) -> Result<Option<Vec<u8>>> {
        let path = stream.get("path").and_then(UnityValue::as_str).unwrap_or_default();
        let size = stream.get("size").and_then(UnityValue::to_i64).unwrap_or_default();
        if path.is_empty() || size <= 0 {
            return Ok(None);
        }
        let offset = stream.get("offset").and_then(UnityValue::to_i64).unwrap_or_default();
        Ok(Some(self.object.read_resource(path, offset as u64, size as u64)?))
    }

    pub fn set_nodes(&mut self, nodes: TypeTreeNode) {
        self.nodes = Some(nodes);
        self.tree = None;
    }

    pub fn nodes(&self) -> Option<&TypeTreeNode> {
        self.nodes.as_ref()
    }

    /// Decoded field tree, read once and cached
    pub fn tree(&mut self) -> Result<&mut UnityValue> {
        if self.tree.is_none() {
            let tree = match &self.nodes {
                Some(nodes) => self.object.read_fields_with(nodes)?,
                None => self.object.read_fields()?,
            };
            self.tree = Some(tree);
        }
        Ok(self.tree.get_or_insert_with(UnityValue::object))
    }

    /// Encode `tree` as the object's new bytes
    pub fn write_tree(&mut self, tree: UnityValue) -> Result<()> {
        self.object.write_fields(&tree, self.nodes.as_ref())?;
        self.tree = Some(tree);
        Ok(())
    }

    pub fn raw_data(&self) -> Result<Vec<u8>> {
        Ok(self.object.raw_data()?)
    }

    pub fn set_raw_data(&mut self, data: Vec<u8>) -> Result<()> {
        self.object.set_raw_data(data)?;
        self.tree = None;
        Ok(())
    }

    /// Object a `PPtr` field of the tree points at
    pub fn follow(&mut self, field: &str) -> Result<ObjectHandle> {
        let value = self
            .tree()?
            .get(field)
            .cloned()
            .unwrap_or_default();
        self.follow_value(&value, field)
    }

    pub fn follow_value(&self, value: &UnityValue, field: &str) -> Result<ObjectHandle> {
        let pptr = PPtr::from_value(value).ok_or_else(|| {
            crate::error::PatcherError::not_found(format!("{} is not a reference", field))
        })?;
        self.object.resolve_pptr(pptr).ok_or_else(|| {
            crate::error::PatcherError::not_found(format!(
                "{} points to a missing object (file {}, #{})",
                field, pptr.file_id, pptr.path_id
            ))
        })
    }

    /// Output folder plus the group parts, optionally followed by `group_name`
    pub fn base_dest(&self, type_name: Option<&str>, group_name: Option<&str>) -> PathBuf {
        let settings = self.settings();
        let mut dest = settings.output_folder.clone();
        let parts: &[&str] = match settings.group_option {
            GroupOption::None => &[],
            GroupOption::Type => &["type"],
            GroupOption::Source => &["source"],
            GroupOption::SourceType => &["source", "type"],
            GroupOption::TypeSource => &["type", "source"],
        };
        for part in parts {
            match *part {
                "type" => dest.push(type_name.unwrap_or(&self.type_name)),
                _ => dest.push(self.source_name()),
            }
        }
        if let Some(group) = group_name {
            dest.push(group);
        }
        dest
    }

    /// `<dir>/<name> [<source>] #<path id><extension>`
    pub fn destination(&self, name: &str, extension: &str, dir: Option<&Path>) -> PathBuf {
        self.indexed_destination(name, None, extension, dir)
    }

    pub fn indexed_destination(&self, name: &str, index: Option<u32>, extension: &str, dir: Option<&Path>) -> PathBuf {
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| self.base_dest(None, None));
        dir.join(patch_file_name(
            &self.fixed_name(Some(name)),
            self.source_name(),
            self.path_id(),
            index,
            extension,
        ))
    }

    pub fn export_dump(&mut self, dir: Option<&Path>) -> Result<()> {
        let tree = self.tree()?.clone();
        let dest = self.destination(&self.name, ".dump.json", dir);
        dump_codec::write_dump(&dest, &tree)
    }

    pub fn export_raw(&self, dir: Option<&Path>) -> Result<()> {
        let dest = self.destination(&self.name, ".obj", dir);
        save_file(&dest, &self.raw_data()?)
    }

    /// Merge a dump into the current tree and write it back
    pub fn import_dump(&mut self, file: &Path) -> Result<()> {
        let dump = dump_codec::read_dump(file)?;
        let mut tree = self.tree()?.clone();
        tree.merge(dump);
        self.write_tree(tree)
    }

    /// Report block used in error logs
    pub fn describe(&self, script: Option<&str>) -> String {
        format!(
            "Name: {}\nType: {}\nScript: {}\nPathID: {}\nSource: {}",
            self.name,
            self.type_name,
            script.unwrap_or("None"),
            self.path_id(),
            self.object.full_source_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_name() {
        assert_eq!(fix_name("a/b:c*d?"), "a-b-c-d-");
        assert_eq!(fix_name("Icon [big] #2"), "Icon -big- -2");
        assert_eq!(fix_name("Enemy(Clone)"), "Enemy(Clone)");
        assert_eq!(fix_name("Enemy(Clone)(Clone)(Clone)"), "Enemy(Clone)x3");
    }
}
