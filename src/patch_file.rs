//! Patch files and the catalog built from a patch folder
//!
//! A patch file name carries the identity of the object it targets:
//!
//! ```text
//! OBJECT_NAME [@SCRIPT_NAME] [SOURCE_FILE] #PATH_ID[_INDEX].EXTENSION
//! ```
//!
//! `dump.json` files hold field tree dumps, `.obj` files hold the raw object
//! bytes, `.content` files hold a secondary payload (image data, audio data)
//! and anything else goes to the type specific importer.

use crate::error::{PatcherError, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

static PATCH_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<object_name>[^#@\[\]]+)(?: @(?P<script_name>[^\[\]]+))? \[(?P<source_file>[^\]]+)\] #(?P<path_id>-?\d+)(?:_(?P<index>\d+))?\.(?P<extension>\w+(\.\w+)?)$",
    )
    .expect("valid patch name regex")
});

/// How a patch file is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchKind {
    Regular,
    Dump,
    Raw,
    RawContent,
}

impl PatchKind {
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "dump.json" => PatchKind::Dump,
            "obj" => PatchKind::Raw,
            "content" => PatchKind::RawContent,
            _ => PatchKind::Regular,
        }
    }

    /// Import order inside one object's batch. A raw replace has to land
    /// before a dump is merged on top of it.
    pub fn priority(self) -> u8 {
        match self {
            PatchKind::Raw => 0,
            PatchKind::Dump => 1,
            PatchKind::RawContent => 2,
            PatchKind::Regular => 3,
        }
    }
}

/// One file of the patch folder
#[derive(Debug)]
pub struct PatchFile {
    pub path: PathBuf,
    pub object_name: Option<String>,
    pub script_name: Option<String>,
    pub source_file: Option<String>,
    pub path_id: Option<i64>,
    pub index: Option<u32>,
    pub extension: Option<String>,
    pub kind: PatchKind,
    detected: AtomicBool,
    imported: AtomicBool,
}

impl PatchFile {
    /// Parse the identity out of the file name. Names that do not follow the
    /// pattern leave every field unset.
    pub fn parse(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut patch = Self {
            path,
            object_name: None,
            script_name: None,
            source_file: None,
            path_id: None,
            index: None,
            extension: None,
            kind: PatchKind::Regular,
            detected: AtomicBool::new(false),
            imported: AtomicBool::new(false),
        };

        let Some(file_name) = patch.path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return patch;
        };
        let Some(captures) = PATCH_NAME_REGEX.captures(&file_name) else {
            return patch;
        };

        let text = |name: &str| captures.name(name).map(|m| m.as_str().to_string());
        patch.object_name = text("object_name");
        patch.script_name = text("script_name");
        patch.source_file = text("source_file");
        patch.path_id = captures.name("path_id").and_then(|m| m.as_str().parse().ok());
        patch.index = captures.name("index").and_then(|m| m.as_str().parse().ok());
        patch.extension = text("extension");
        if let Some(extension) = &patch.extension {
            patch.kind = PatchKind::from_extension(extension);
        }
        patch
    }

    /// Script class named by the patch, without a `.cs` suffix
    pub fn script_class(&self) -> Option<&str> {
        self.script_name
            .as_deref()
            .map(|script| script.strip_suffix(".cs").unwrap_or(script))
    }

    /// Usable patches have a non-zero path id and at least one name
    pub fn is_valid(&self) -> bool {
        matches!(self.path_id, Some(id) if id != 0)
            && (self.source_file.is_some() || self.object_name.is_some() || self.script_name.is_some())
    }

    pub fn is_detected(&self) -> bool {
        self.detected.load(Ordering::Relaxed)
    }

    pub fn is_imported(&self) -> bool {
        self.imported.load(Ordering::Relaxed)
    }

    pub fn mark_detected(&self) {
        self.detected.store(true, Ordering::Relaxed);
    }

    pub fn mark_imported(&self) {
        self.imported.store(true, Ordering::Relaxed);
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}

/// Build the file name an exported object is stored under.
///
/// `name` is expected to be sanitized already; `extension` includes the dot.
pub fn patch_file_name(name: &str, source_file: &str, path_id: i64, index: Option<u32>, extension: &str) -> String {
    match index {
        Some(index) => format!("{} [{}] #{}_{}{}", name, source_file, path_id, index, extension),
        None => format!("{} [{}] #{}{}", name, source_file, path_id, extension),
    }
}

/// Patches that never matched a loaded object, grouped by target
#[derive(Debug, Clone)]
pub struct UndetectedAsset {
    pub name: String,
    pub source_file: String,
    pub path_id: i64,
    pub patch_files: Vec<Arc<PatchFile>>,
}

/// Parsed contents of a patch folder, or a view into one.
///
/// Views share the underlying [`PatchFile`]s, so flags set through a view
/// are visible from the catalog it was taken from.
#[derive(Debug, Clone, Default)]
pub struct PatchCatalog {
    folder: Option<PathBuf>,
    patches: Vec<Arc<PatchFile>>,
}

impl PatchCatalog {
    /// Walk `folder` recursively and keep every valid patch file
    pub fn scan(folder: &Path) -> Result<Self> {
        if !folder.is_dir() {
            return Err(PatcherError::InvalidPatchFolder(folder.to_path_buf()));
        }

        let mut patches = Vec::new();
        for entry in WalkDir::new(folder).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let patch = PatchFile::parse(entry.path());
            if patch.is_valid() {
                patches.push(Arc::new(patch));
            } else {
                tracing::debug!("Skipping {}: not a patch file name", entry.path().display());
            }
        }

        Ok(Self {
            folder: Some(folder.to_path_buf()),
            patches,
        })
    }

    pub fn from_patches(patches: Vec<Arc<PatchFile>>) -> Self {
        Self { folder: None, patches }
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PatchFile>> {
        self.patches.iter()
    }

    /// Patches targeting one object, ordered by index with unindexed first.
    ///
    /// `script_name` and `object_name` only constrain the match when given.
    pub fn lookup(
        &self,
        source_file: &str,
        path_id: i64,
        script_name: Option<&str>,
        object_name: Option<&str>,
    ) -> Option<PatchCatalog> {
        let mut patches: Vec<Arc<PatchFile>> = self
            .patches
            .iter()
            .filter(|patch| {
                patch.source_file.as_deref() == Some(source_file)
                    && patch.path_id == Some(path_id)
                    && script_name.is_none_or(|name| patch.script_class() == Some(name))
                    && object_name.is_none_or(|name| patch.object_name.as_deref() == Some(name))
            })
            .cloned()
            .collect();

        if patches.is_empty() {
            return None;
        }
        patches.sort_by_key(|patch| (patch.index.is_some(), patch.index));
        Some(Self::from_patches(patches))
    }

    /// Stable sort into import order: raw, dump, raw content, regular
    pub fn sort_by_kind(&mut self) -> &[Arc<PatchFile>] {
        self.patches.sort_by_key(|patch| patch.kind.priority());
        &self.patches
    }

    /// Source file name to the path ids it is patched at
    pub fn sort_by_source(&self) -> IndexMap<String, Vec<i64>> {
        let mut sorted: IndexMap<String, Vec<i64>> = IndexMap::new();
        for patch in &self.patches {
            if let (Some(source), Some(path_id)) = (&patch.source_file, patch.path_id) {
                sorted.entry(source.clone()).or_default().push(path_id);
            }
        }
        sorted
    }

    /// Targets whose patches were never matched to a loaded object
    pub fn undetected(&self) -> Vec<UndetectedAsset> {
        let mut grouped: IndexMap<(Option<String>, Option<i64>), UndetectedAsset> = IndexMap::new();
        for patch in self.patches.iter().filter(|p| !p.is_detected()) {
            let key = (patch.source_file.clone(), patch.path_id);
            grouped
                .entry(key)
                .or_insert_with(|| UndetectedAsset {
                    name: patch.object_name.clone().unwrap_or_default(),
                    source_file: patch.source_file.clone().unwrap_or_default(),
                    path_id: patch.path_id.unwrap_or_default(),
                    patch_files: Vec::new(),
                })
                .patch_files
                .push(patch.clone());
        }
        grouped.into_values().collect()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.patches
            .iter()
            .filter_map(|patch| patch.source_file.clone())
            .collect()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.patches.iter().map(|patch| patch.path.clone()).collect()
    }

    pub fn imported_patches(&self) -> PatchCatalog {
        Self::from_patches(
            self.patches
                .iter()
                .filter(|patch| patch.is_imported())
                .cloned()
                .collect(),
        )
    }

    pub fn remove_by_path(&mut self, path: &Path) {
        self.patches.retain(|patch| patch.path != path);
    }

    pub fn mark_detected(&self) {
        self.patches.iter().for_each(|patch| patch.mark_detected());
    }

    pub fn mark_imported(&self) {
        self.patches.iter().for_each(|patch| patch.mark_imported());
    }

    /// Log every parsed field, for `--debug`
    pub fn display_info(&self) {
        tracing::debug!("[Patch Files]");
        for patch in &self.patches {
            tracing::debug!(
                "Path: {} | Object: {:?} | Source: {:?} | Script: {:?} | Path ID: {:?} | Index: {:?} | Extension: {:?} | Kind: {:?}",
                patch.path.display(),
                patch.object_name,
                patch.source_file,
                patch.script_name,
                patch.path_id,
                patch.index,
                patch.extension,
                patch.kind
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_parse_dump_name() {
        let patch = PatchFile::parse("patches/Health Potion [CAB-abc123] #481.dump.json");
        assert_eq!(patch.object_name.as_deref(), Some("Health Potion"));
        assert_eq!(patch.script_name, None);
        assert_eq!(patch.source_file.as_deref(), Some("CAB-abc123"));
        assert_eq!(patch.path_id, Some(481));
        assert_eq!(patch.index, None);
        assert_eq!(patch.extension.as_deref(), Some("dump.json"));
        assert_eq!(patch.kind, PatchKind::Dump);
        assert!(patch.is_valid());
    }

    #[test]
    fn test_parse_script_and_index() {
        let patch = PatchFile::parse("PlayerController @PlayerController.cs [level0] #1029.json");
        assert_eq!(patch.object_name.as_deref(), Some("PlayerController"));
        assert_eq!(patch.script_name.as_deref(), Some("PlayerController.cs"));
        assert_eq!(patch.script_class(), Some("PlayerController"));
        assert_eq!(patch.source_file.as_deref(), Some("level0"));
        assert_eq!(patch.kind, PatchKind::Regular);

        let layer = PatchFile::parse("Explosion [sharedassets0.assets] #77_2.png");
        assert_eq!(layer.path_id, Some(77));
        assert_eq!(layer.index, Some(2));
        assert_eq!(layer.extension.as_deref(), Some("png"));
    }

    #[test]
    fn test_parse_negative_id_and_kinds() {
        let raw = PatchFile::parse("Boss [CAB-1] #-9120391.obj");
        assert_eq!(raw.path_id, Some(-9120391));
        assert_eq!(raw.kind, PatchKind::Raw);
        assert_eq!(PatchFile::parse("Boss [CAB-1] #5.content").kind, PatchKind::RawContent);
    }

    #[test]
    fn test_invalid_names() {
        assert!(!PatchFile::parse("readme.txt").is_valid());
        assert!(!PatchFile::parse("Bad#Name [CAB-1] #5.png").is_valid());
        assert!(!PatchFile::parse("Zero [CAB-1] #0.png").is_valid());
    }

    #[test]
    fn test_name_roundtrip() {
        let name = patch_file_name("Explosion", "sharedassets0.assets", -77, Some(2), ".png");
        let patch = PatchFile::parse(&name);
        assert_eq!(patch.object_name.as_deref(), Some("Explosion"));
        assert_eq!(patch.source_file.as_deref(), Some("sharedassets0.assets"));
        assert_eq!(patch.path_id, Some(-77));
        assert_eq!(patch.index, Some(2));
        assert_eq!(patch.extension.as_deref(), Some("png"));
    }

    #[test]
    fn test_lookup_orders_by_index() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "A [CAB-x] #1_1.png");
        touch(dir.path(), "A [CAB-x] #1_0.png");
        touch(dir.path(), "A [CAB-x] #1.png");
        touch(dir.path(), "A [CAB-y] #1.png");
        touch(dir.path(), "notes.txt");

        let catalog = PatchCatalog::scan(dir.path()).unwrap();
        assert_eq!(catalog.len(), 4);

        let found = catalog.lookup("CAB-x", 1, None, None).unwrap();
        let names: Vec<String> = found.iter().map(|p| p.file_name()).collect();
        assert_eq!(names, vec!["A [CAB-x] #1.png", "A [CAB-x] #1_0.png", "A [CAB-x] #1_1.png"]);

        assert!(catalog.lookup("CAB-x", 2, None, None).is_none());
        assert!(catalog.lookup("CAB-x", 1, None, Some("B")).is_none());
        assert!(catalog.lookup("CAB-x", 1, None, Some("A")).is_some());
    }

    #[test]
    fn test_sort_by_kind_is_stable() {
        let mut batch = PatchCatalog::from_patches(
            [
                "Coin [CAB-x] #10.png",
                "Coin [CAB-x] #10.obj",
                "Coin [CAB-x] #10.dump.json",
                "Coin [CAB-x] #10.content",
                "Coin [CAB-x] #10.txt",
            ]
            .into_iter()
            .map(|name| Arc::new(PatchFile::parse(name)))
            .collect(),
        );
        let kinds: Vec<(PatchKind, String)> = batch
            .sort_by_kind()
            .iter()
            .map(|p| (p.kind, p.extension.clone().unwrap()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (PatchKind::Raw, "obj".to_string()),
                (PatchKind::Dump, "dump.json".to_string()),
                (PatchKind::RawContent, "content".to_string()),
                (PatchKind::Regular, "png".to_string()),
                (PatchKind::Regular, "txt".to_string()),
            ]
        );
    }

    #[test]
    fn test_undetected_groups_by_target() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Coin [CAB-x] #10.png");
        touch(dir.path(), "Coin [CAB-x] #10.dump.json");
        touch(dir.path(), "Gem [CAB-x] #11.png");

        let catalog = PatchCatalog::scan(dir.path()).unwrap();
        catalog.lookup("CAB-x", 11, None, None).unwrap().mark_detected();

        let undetected = catalog.undetected();
        assert_eq!(undetected.len(), 1);
        assert_eq!(undetected[0].name, "Coin");
        assert_eq!(undetected[0].path_id, 10);
        assert_eq!(undetected[0].patch_files.len(), 2);
    }

    #[test]
    fn test_views_share_flags() {
        let dir = tempfile::tempdir().unwrap();
        let coin = touch(dir.path(), "Coin [CAB-x] #10.png");
        touch(dir.path(), "Gem [sharedassets1.assets] #11.png");

        let mut catalog = PatchCatalog::scan(dir.path()).unwrap();
        catalog.lookup("CAB-x", 10, None, None).unwrap().mark_imported();
        assert_eq!(catalog.imported_patches().paths(), vec![coin.clone()]);

        let by_source = catalog.sort_by_source();
        assert_eq!(by_source["CAB-x"], vec![10]);
        assert_eq!(by_source["sharedassets1.assets"], vec![11]);

        catalog.remove_by_path(&coin);
        assert_eq!(catalog.source_names(), vec!["sharedassets1.assets".to_string()]);
    }

    #[test]
    fn test_scan_rejects_missing_folder() {
        let err = PatchCatalog::scan(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, PatcherError::InvalidPatchFolder(_)));
    }
}
