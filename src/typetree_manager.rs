//! Script layouts for MonoBehaviours without an embedded type tree
//!
//! Layouts come from a [`TypeTreeGenerator`]. The shipped generator reads
//! pre-generated JSON files from `<Managed>/typetrees/<Assembly>.json`,
//! each a map of class path to a flat node list.

use crate::error::{PatcherError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use unity_patcher_binary::{ScriptInfo, TypeTreeNode, UnityVersion};
use walkdir::WalkDir;

/// Source of script layouts
pub trait TypeTreeGenerator: Send + Sync {
    /// Flat node list for `class_path` in `assembly`, if the generator knows it
    fn get_layout(
        &self,
        assembly: &str,
        class_path: &str,
        version: &UnityVersion,
    ) -> Result<Option<Vec<TypeTreeNode>>>;
}

/// Reads `typetrees/<Assembly>.json` files next to the game assemblies
#[derive(Debug, Clone)]
pub struct JsonLayoutGenerator {
    managed_folder: PathBuf,
}

impl JsonLayoutGenerator {
    pub fn new(managed_folder: impl Into<PathBuf>) -> Self {
        Self {
            managed_folder: managed_folder.into(),
        }
    }

    fn layout_file(&self, assembly: &str) -> PathBuf {
        let stem = assembly.strip_suffix(".dll").unwrap_or(assembly);
        self.managed_folder
            .join("typetrees")
            .join(format!("{}.json", stem))
    }
}

impl TypeTreeGenerator for JsonLayoutGenerator {
    fn get_layout(
        &self,
        assembly: &str,
        class_path: &str,
        _version: &UnityVersion,
    ) -> Result<Option<Vec<TypeTreeNode>>> {
        let file = self.layout_file(assembly);
        if !file.is_file() {
            tracing::debug!("No layout file {}", file.display());
            return Ok(None);
        }
        let mut layouts: IndexMap<String, Vec<TypeTreeNode>> =
            serde_json::from_str(&std::fs::read_to_string(&file)?)?;
        Ok(layouts.shift_remove(class_path))
    }
}

/// First `Managed` directory below `game_folder`
pub fn find_managed_folder(game_folder: &Path) -> Option<PathBuf> {
    WalkDir::new(game_folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_dir() && entry.file_name() == "Managed")
        .map(|entry| entry.into_path())
}

/// Process-wide layout cache keyed by `(assembly, class path)`
pub struct TypeTreeManager {
    generator: Option<Box<dyn TypeTreeGenerator>>,
    cache: Mutex<HashMap<(String, String), TypeTreeNode>>,
}

impl std::fmt::Debug for TypeTreeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeTreeManager")
            .field("has_generator", &self.generator.is_some())
            .finish()
    }
}

impl TypeTreeManager {
    pub fn new(generator: Option<Box<dyn TypeTreeGenerator>>) -> Self {
        Self {
            generator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Use the `--managed` folder, or look for `Managed` under the game folder
    pub fn from_folders(managed_path: Option<&Path>, game_folder: &Path) -> Self {
        let managed = match managed_path {
            Some(path) if path.is_dir() => Some(path.to_path_buf()),
            Some(path) => {
                tracing::warn!("The provided Managed folder does not exist: {}", path.display());
                find_managed_folder(game_folder)
            }
            None => find_managed_folder(game_folder),
        };
        let generator = managed.map(|folder| {
            tracing::debug!("Script layouts from {}", folder.display());
            Box::new(JsonLayoutGenerator::new(folder)) as Box<dyn TypeTreeGenerator>
        });
        Self::new(generator)
    }

    /// Layout of the script's class, generated once and cached
    pub fn get_nodes(&self, script: &ScriptInfo, version: &UnityVersion) -> Result<TypeTreeNode> {
        let class_path = script.full_name();
        let key = (script.assembly_name.clone(), class_path.clone());

        if let Some(tree) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(tree.clone());
        }

        let Some(generator) = &self.generator else {
            tracing::warn!("[WARN] Typetree was not generated because Managed was not in the game folder.");
            return Err(PatcherError::not_found(format!("Nodes not found: <{}>", class_path)));
        };

        let nodes = generator
            .get_layout(&script.assembly_name, &class_path, version)?
            .filter(|nodes| !nodes.is_empty())
            .ok_or_else(|| PatcherError::not_found(format!("Nodes not found: <{}>", class_path)))?;
        let tree = TypeTreeNode::from_flat(nodes)?;

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, tree.clone());
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    impl TypeTreeGenerator for CountingGenerator {
        fn get_layout(&self, _: &str, class_path: &str, _: &UnityVersion) -> Result<Option<Vec<TypeTreeNode>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if class_path != "Game.Player" {
                return Ok(None);
            }
            Ok(Some(vec![
                TypeTreeNode::with_info("MonoBehaviour", "Base", 0),
                TypeTreeNode::with_info("int", "m_Health", 1),
            ]))
        }
    }

    fn script(namespace: &str, class_name: &str) -> ScriptInfo {
        ScriptInfo {
            class_name: class_name.to_string(),
            namespace: namespace.to_string(),
            assembly_name: "Assembly-CSharp.dll".to_string(),
        }
    }

    #[test]
    fn test_layouts_are_cached() {
        let manager = TypeTreeManager::new(Some(Box::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        })));
        let version = UnityVersion::new(2021, 3, 5);
        let first = manager.get_nodes(&script("Game", "Player"), &version).unwrap();
        let second = manager.get_nodes(&script("Game", "Player"), &version).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.children[0].name, "m_Health");

        let err = manager.get_nodes(&script("", "Enemy"), &version).unwrap_err();
        assert_eq!(err.to_string(), "Nodes not found: <Enemy>");
    }

    #[test]
    fn test_json_layout_files() {
        let dir = tempfile::tempdir().unwrap();
        let managed = dir.path().join("Game_Data").join("Managed");
        std::fs::create_dir_all(managed.join("typetrees")).unwrap();
        std::fs::write(
            managed.join("typetrees").join("Assembly-CSharp.json"),
            r#"{"Game.Player": [
                {"m_Type": "MonoBehaviour", "m_Name": "Base", "m_Level": 0, "m_MetaFlag": 0},
                {"m_Type": "float", "m_Name": "m_Speed", "m_Level": 1, "m_MetaFlag": 0}
            ]}"#,
        )
        .unwrap();

        assert_eq!(find_managed_folder(dir.path()), Some(managed.clone()));
        let manager = TypeTreeManager::from_folders(None, dir.path());
        let tree = manager
            .get_nodes(&script("Game", "Player"), &UnityVersion::default())
            .unwrap();
        assert_eq!(tree.children[0].type_name, "float");
    }

    #[test]
    fn test_missing_managed_folder() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TypeTreeManager::from_folders(None, dir.path());
        assert!(manager.get_nodes(&script("Game", "Player"), &UnityVersion::default()).is_err());
    }
}
