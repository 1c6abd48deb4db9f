//! Loaded files and object handles
//!
//! An [`Environment`] owns every container opened during a run. It is
//! shared between worker threads behind an `Arc`; object edits go through
//! [`ObjectHandle`] and are serialized by one environment-wide save lock.

use crate::bundle::{BundleFile, BundleHeader, Packer};
use crate::compression;
use crate::error::{BinaryError, Result};
use crate::reader::{BinaryReader, ByteOrder};
use crate::resource::ResourceFile;
use crate::serialized_file::{ObjectInfo, SerializedFile, SerializedFileHeader};
use crate::typetree::{TypeTreeNode, read_typetree, write_typetree};
use crate::unity_version::UnityVersion;
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use unity_patcher_core::{ClassIdType, UnityValue};

const RESOURCE_EXTENSIONS: [&str; 2] = ["ress", "resource"];

/// Callback used when a referenced file is not loaded yet.
/// Returns true when it managed to load something for the name.
pub type FallbackLoader = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// A top-level loaded container
#[derive(Debug, Clone)]
pub enum EnvFile {
    Serialized(Arc<SerializedFile>),
    Bundle(Arc<BundleFile>),
    Resource(Arc<ResourceFile>),
}

impl EnvFile {
    pub fn name(&self) -> &str {
        match self {
            EnvFile::Serialized(file) => file.name(),
            EnvFile::Bundle(bundle) => bundle.name(),
            EnvFile::Resource(blob) => blob.name(),
        }
    }

    pub fn is_changed(&self) -> bool {
        match self {
            EnvFile::Serialized(file) => file.is_changed(),
            EnvFile::Bundle(bundle) => bundle.is_changed(),
            EnvFile::Resource(blob) => blob.is_changed(),
        }
    }

    /// Serialized files held by this container
    pub fn serialized_files(&self) -> Vec<Arc<SerializedFile>> {
        match self {
            EnvFile::Serialized(file) => vec![file.clone()],
            EnvFile::Bundle(bundle) => bundle.serialized_files().cloned().collect(),
            EnvFile::Resource(_) => Vec::new(),
        }
    }

    /// Bytes to write back; `packer` only matters for bundles
    pub fn to_bytes(&self, packer: Packer) -> Result<Vec<u8>> {
        match self {
            EnvFile::Serialized(file) => file.to_bytes(),
            EnvFile::Bundle(bundle) => bundle.to_bytes(packer),
            EnvFile::Resource(blob) => Ok(blob.bytes()),
        }
    }
}

/// Shared set of loaded files
pub struct Environment {
    files: RwLock<IndexMap<String, EnvFile>>,
    paths: RwLock<IndexMap<String, PathBuf>>,
    search_dirs: RwLock<Vec<PathBuf>>,
    fallback: OnceLock<FallbackLoader>,
    save_lock: Mutex<()>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("files", &self.file_names())
            .finish()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            files: RwLock::new(IndexMap::new()),
            paths: RwLock::new(IndexMap::new()),
            search_dirs: RwLock::new(Vec::new()),
            fallback: OnceLock::new(),
            save_lock: Mutex::new(()),
        }
    }
}

impl Environment {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Directory searched when a dependency is referenced by bare name
    pub fn add_search_dir(&self, dir: impl Into<PathBuf>) {
        self.search_dirs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dir.into());
    }

    /// Install the loader consulted before giving up on a missing file.
    /// Only the first call has an effect.
    pub fn set_fallback_loader(&self, loader: FallbackLoader) {
        let _ = self.fallback.set(loader);
    }

    /// Hold while mutating object bytes or resource blobs
    pub fn save_lock(&self) -> MutexGuard<'_, ()> {
        self.save_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read and register a file from disk under its file name
    pub fn load_file(&self, path: &Path) -> Result<EnvFile> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BinaryError::invalid_data(format!("Not a file: {}", path.display())))?;
        let data = std::fs::read(path)?;
        let data = compression::unwrap_transport(&name, data)?;
        let name = strip_transport_suffix(&name);
        let file = self.load_bytes(&name, data)?;
        self.record_path(&name, path);
        Ok(file)
    }

    /// Register a container that belongs at `path` on disk
    pub fn insert_at(&self, file: EnvFile, path: &Path) {
        let name = file.name().to_string();
        self.insert(file);
        self.record_path(&name, path);
    }

    fn record_path(&self, name: &str, path: &Path) {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), path.to_path_buf());
    }

    /// Disk location a container was loaded from
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Detect the container kind and register it
    pub fn load_bytes(&self, name: &str, data: Vec<u8>) -> Result<EnvFile> {
        let file = if BundleHeader::is_bundle(&data) {
            EnvFile::Bundle(Arc::new(BundleFile::from_bytes(name, &data)?))
        } else if SerializedFileHeader::looks_valid(&data) {
            EnvFile::Serialized(Arc::new(SerializedFile::from_bytes(name, &data)?))
        } else if is_resource_name(name) {
            EnvFile::Resource(Arc::new(ResourceFile::new(name, data)))
        } else {
            return Err(BinaryError::invalid_format(format!(
                "{} is not a bundle, serialized file or resource",
                name
            )));
        };
        tracing::debug!("Loaded {} ({:?})", name, kind_of(&file));
        self.insert(file.clone());
        Ok(file)
    }

    /// Register an already built container, replacing one with the same name
    pub fn insert(&self, file: EnvFile) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file.name().to_string(), file);
    }

    pub fn get(&self, name: &str) -> Option<EnvFile> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn files(&self) -> Vec<EnvFile> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Containers with pending edits
    pub fn changed_files(&self) -> Vec<EnvFile> {
        self.files().into_iter().filter(EnvFile::is_changed).collect()
    }

    /// Every serialized file, standalone or inside a bundle
    pub fn serialized_files(&self) -> Vec<Arc<SerializedFile>> {
        self.files()
            .iter()
            .flat_map(EnvFile::serialized_files)
            .collect()
    }

    /// Serialized file by container name among already loaded files
    pub fn find_cab(&self, name: &str) -> Option<Arc<SerializedFile>> {
        let wanted = base_name(name);
        self.serialized_files()
            .into_iter()
            .find(|file| file.name().eq_ignore_ascii_case(wanted))
    }

    /// Serialized file by container name, case-insensitive.
    /// Falls back to the installed loader and the search directories.
    pub fn get_cab(&self, name: &str) -> Option<Arc<SerializedFile>> {
        if let Some(file) = self.find_cab(name) {
            return Some(file);
        }
        if self.load_dependency(base_name(name)) {
            return self.find_cab(name);
        }
        None
    }

    /// Resource blob by name among already loaded files
    pub fn find_resource(&self, name: &str) -> Option<Arc<ResourceFile>> {
        let wanted = base_name(name);
        self.files().into_iter().find_map(|file| match file {
            EnvFile::Resource(blob) if blob.name().eq_ignore_ascii_case(wanted) => Some(blob),
            EnvFile::Bundle(bundle) => bundle
                .resources()
                .find(|blob| blob.name().eq_ignore_ascii_case(wanted))
                .cloned(),
            _ => None,
        })
    }

    /// Resource blob by name; accepts `archive:/CAB-x/CAB-x.resS` style paths
    pub fn get_resource(&self, name: &str) -> Option<Arc<ResourceFile>> {
        if let Some(blob) = self.find_resource(name) {
            return Some(blob);
        }
        if self.load_dependency(base_name(name)) {
            return self.find_resource(name);
        }
        None
    }

    /// Bundle that holds the given serialized file
    pub fn bundle_of(&self, file: &SerializedFile) -> Option<Arc<BundleFile>> {
        let parent = file.parent()?;
        match self.get(parent)? {
            EnvFile::Bundle(bundle) => Some(bundle),
            _ => None,
        }
    }

    /// Whether `name` sits inside the same container as `file`
    pub fn shares_container(&self, file: &SerializedFile, name: &str) -> bool {
        match self.bundle_of(file) {
            Some(bundle) => bundle.find_entry(base_name(name)).is_some(),
            None => false,
        }
    }

    fn load_dependency(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if let Some(loader) = self.fallback.get() {
            if loader(name) {
                return true;
            }
        }
        let dirs = self
            .search_dirs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for dir in dirs {
            let candidate = dir.join(name);
            if !candidate.is_file() {
                continue;
            }
            match self.load_file(&candidate) {
                Ok(_) => return true,
                Err(e) => tracing::warn!("Can't load dependency {}: {}", name, e),
            }
        }
        false
    }

    /// Handles for every object of every serialized file
    pub fn objects(self: &Arc<Self>) -> Vec<ObjectHandle> {
        self.serialized_files()
            .iter()
            .flat_map(|file| self.objects_in(file))
            .collect()
    }

    /// Handles for the objects of one serialized file
    pub fn objects_in(self: &Arc<Self>, file: &Arc<SerializedFile>) -> Vec<ObjectHandle> {
        file.object_ids()
            .into_iter()
            .map(|path_id| ObjectHandle::new(self.clone(), file.clone(), path_id))
            .collect()
    }
}

fn kind_of(file: &EnvFile) -> &'static str {
    match file {
        EnvFile::Serialized(_) => "serialized",
        EnvFile::Bundle(_) => "bundle",
        EnvFile::Resource(_) => "resource",
    }
}

/// Last path component of a Unity or OS path
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn strip_transport_suffix(name: &str) -> String {
    for suffix in [".br", ".gz", ".unityweb"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    name.to_string()
}

fn is_resource_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            RESOURCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Identity of the script behind a MonoBehaviour
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptInfo {
    pub class_name: String,
    pub namespace: String,
    pub assembly_name: String,
}

impl ScriptInfo {
    /// `Namespace.Class`, or the class name alone
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.namespace, self.class_name)
        }
    }
}

/// A `{m_FileID, m_PathID}` reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PPtr {
    pub file_id: i32,
    pub path_id: i64,
}

impl PPtr {
    /// Read from a decoded `PPtr<T>` value
    pub fn from_value(value: &UnityValue) -> Option<Self> {
        Some(Self {
            file_id: value.get("m_FileID")?.to_i64()? as i32,
            path_id: value.get("m_PathID")?.to_i64()?,
        })
    }

    pub fn is_null(&self) -> bool {
        self.path_id == 0
    }
}

/// One object inside a loaded serialized file
#[derive(Clone)]
pub struct ObjectHandle {
    env: Arc<Environment>,
    file: Arc<SerializedFile>,
    path_id: i64,
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("file", &self.file.name())
            .field("path_id", &self.path_id)
            .finish()
    }
}

impl ObjectHandle {
    pub fn new(env: Arc<Environment>, file: Arc<SerializedFile>, path_id: i64) -> Self {
        Self { env, file, path_id }
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn serialized_file(&self) -> &Arc<SerializedFile> {
        &self.file
    }

    pub fn path_id(&self) -> i64 {
        self.path_id
    }

    /// Name of the serialized file the object lives in
    pub fn assets_file_name(&self) -> &str {
        self.file.name()
    }

    /// `bundle/CAB-x` for bundle entries, the file name otherwise
    pub fn full_source_name(&self) -> String {
        match self.file.parent() {
            Some(parent) => format!("{}/{}", parent, self.file.name()),
            None => self.file.name().to_string(),
        }
    }

    fn info(&self) -> Result<ObjectInfo> {
        self.file.object_info(self.path_id).ok_or_else(|| {
            BinaryError::not_found(format!(
                "Object #{} not found in {}",
                self.path_id,
                self.file.name()
            ))
        })
    }

    pub fn class_id(&self) -> i32 {
        self.file
            .object_info(self.path_id)
            .map(|info| info.class_id)
            .unwrap_or(0)
    }

    pub fn class(&self) -> ClassIdType {
        ClassIdType::from_id(self.class_id())
    }

    pub fn type_name(&self) -> String {
        self.class().name()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.file.byte_order()
    }

    pub fn unity_version(&self) -> UnityVersion {
        self.file.version()
    }

    /// Embedded layout of the object, if the file carries one
    pub fn type_tree(&self) -> Option<TypeTreeNode> {
        let info = self.file.object_info(self.path_id)?;
        self.file.type_tree(&info).cloned()
    }

    pub fn raw_data(&self) -> Result<Vec<u8>> {
        self.file.object_data(self.path_id).ok_or_else(|| {
            BinaryError::not_found(format!(
                "Object #{} not found in {}",
                self.path_id,
                self.file.name()
            ))
        })
    }

    /// Replace the object's bytes
    pub fn set_raw_data(&self, data: Vec<u8>) -> Result<()> {
        let _guard = self.env.save_lock();
        self.file.set_object_data(self.path_id, data)
    }

    /// Decode with the embedded layout
    pub fn read_fields(&self) -> Result<UnityValue> {
        let tree = self.type_tree().ok_or_else(|| {
            BinaryError::not_found(format!(
                "No type tree for {} #{}",
                self.type_name(),
                self.path_id
            ))
        })?;
        self.read_fields_with(&tree)
    }

    /// Decode with a caller-supplied layout
    pub fn read_fields_with(&self, tree: &TypeTreeNode) -> Result<UnityValue> {
        read_typetree(&self.raw_data()?, tree, self.byte_order())
    }

    /// Encode `value` and store it as the object's bytes.
    /// Uses `tree` when given, the embedded layout otherwise.
    pub fn write_fields(&self, value: &UnityValue, tree: Option<&TypeTreeNode>) -> Result<()> {
        let embedded;
        let tree = match tree {
            Some(tree) => tree,
            None => {
                embedded = self.type_tree().ok_or_else(|| {
                    BinaryError::not_found(format!(
                        "No type tree for {} #{}",
                        self.type_name(),
                        self.path_id
                    ))
                })?;
                &embedded
            }
        };
        let data = write_typetree(value, tree, self.byte_order())?;
        self.set_raw_data(data)
    }

    fn pptr_size(&self) -> usize {
        if self.file.format() >= 14 { 12 } else { 8 }
    }

    fn read_pptr_at(&self, data: &[u8], offset: usize) -> Result<PPtr> {
        let mut reader = BinaryReader::new(data, self.byte_order());
        reader.set_position(offset)?;
        let file_id = reader.read_i32()?;
        let path_id = if self.file.format() >= 14 {
            reader.read_i64()?
        } else {
            reader.read_i32()? as i64
        };
        Ok(PPtr { file_id, path_id })
    }

    /// Object name without a full decode where the layout allows it
    pub fn peek_name(&self) -> Option<String> {
        if self.type_tree().is_some() {
            return self
                .read_fields()
                .ok()?
                .get("m_Name")?
                .as_str()
                .map(str::to_string);
        }
        let data = self.raw_data().ok()?;
        let offset = match self.class() {
            ClassIdType::MonoBehaviour => self.pptr_size() * 2 + 4,
            class if class.is_named_object() => 0,
            _ => return None,
        };
        let mut reader = BinaryReader::new(&data, self.byte_order());
        reader.set_position(offset).ok()?;
        reader.read_aligned_string().ok()
    }

    /// `m_Script` of a MonoBehaviour
    pub fn script_pptr(&self) -> Option<PPtr> {
        if self.class() != ClassIdType::MonoBehaviour {
            return None;
        }
        if self.type_tree().is_some() {
            return self
                .read_fields()
                .ok()
                .and_then(|fields| fields.get("m_Script").and_then(PPtr::from_value));
        }
        let data = self.raw_data().ok()?;
        self.read_pptr_at(&data, self.pptr_size() + 4).ok()
    }

    /// Follow a reference relative to this object's file
    pub fn resolve_pptr(&self, pptr: PPtr) -> Option<ObjectHandle> {
        if pptr.is_null() {
            return None;
        }
        let file = if pptr.file_id == 0 {
            self.file.clone()
        } else {
            let external = self.file.external(pptr.file_id)?;
            self.env.get_cab(&external.file_name())?
        };
        file.object_info(pptr.path_id)?;
        Some(ObjectHandle::new(self.env.clone(), file, pptr.path_id))
    }

    /// Script identity of a MonoBehaviour (class, namespace, assembly)
    pub fn script(&self) -> Option<ScriptInfo> {
        let script = self.resolve_pptr(self.script_pptr()?)?;
        if script.class() != ClassIdType::MonoScript {
            return None;
        }
        if script.type_tree().is_some() {
            let fields = script.read_fields().ok()?;
            let text = |key: &str| {
                fields
                    .get(key)
                    .and_then(UnityValue::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            return Some(ScriptInfo {
                class_name: text("m_ClassName"),
                namespace: text("m_Namespace"),
                assembly_name: text("m_AssemblyName"),
            });
        }
        script.read_stripped_script().ok()
    }

    fn read_stripped_script(&self) -> Result<ScriptInfo> {
        let data = self.raw_data()?;
        let mut reader = BinaryReader::new(&data, self.byte_order());
        reader.read_aligned_string()?; // m_Name
        reader.read_i32()?; // m_ExecutionOrder
        if self.unity_version().at_least(5, 0) {
            reader.take(16)?; // m_PropertiesHash
        } else {
            reader.read_u32()?;
        }
        Ok(ScriptInfo {
            class_name: reader.read_aligned_string()?,
            namespace: reader.read_aligned_string()?,
            assembly_name: reader.read_aligned_string()?,
        })
    }

    /// Bytes of an external payload (`m_Resource`, `m_StreamData`, ...)
    pub fn read_resource(&self, path: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        let blob = self
            .env
            .get_resource(path)
            .ok_or_else(|| BinaryError::not_found(format!("Resource {} not found", path)))?;
        blob.slice(offset, size)
            .ok_or_else(|| BinaryError::not_enough_data(offset.saturating_add(size) as usize, blob.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialized_file::SerializedFileBuilder;

    fn text_asset_tree() -> TypeTreeNode {
        let mut string = TypeTreeNode::with_info("string", "m_Name", 1);
        let mut array = TypeTreeNode::with_info("Array", "Array", 2);
        array.type_flags = 1;
        array.meta_flags = crate::typetree::ALIGN_FLAG;
        array.children = vec![
            TypeTreeNode::with_info("int", "size", 3),
            TypeTreeNode::with_info("char", "data", 3),
        ];
        string.children = vec![array];
        let mut script = string.clone();
        script.name = "m_Script".to_string();
        let mut root = TypeTreeNode::with_info("TextAsset", "Base", 0);
        root.children = vec![string, script];
        root
    }

    fn aligned_string(text: &str) -> Vec<u8> {
        let mut out = (text.len() as i32).to_le_bytes().to_vec();
        out.extend_from_slice(text.as_bytes());
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    fn sample_env() -> Arc<Environment> {
        let mut builder = SerializedFileBuilder::new("sharedassets0.assets", "2021.3.5f1");
        let ty = builder.add_type(49, text_asset_tree());
        let mut data = aligned_string("Intro");
        data.extend(aligned_string("hello"));
        builder.add_object(7, ty, data).unwrap();

        let env = Environment::new();
        env.insert(EnvFile::Serialized(Arc::new(builder.build())));
        env.insert(EnvFile::Resource(Arc::new(ResourceFile::new(
            "sharedassets0.resource",
            (0u8..32).collect(),
        ))));
        env
    }

    #[test]
    fn test_read_and_write_fields() {
        let env = sample_env();
        let objects = env.objects();
        assert_eq!(objects.len(), 1);

        let obj = &objects[0];
        assert_eq!(obj.class(), ClassIdType::TextAsset);
        assert_eq!(obj.peek_name().as_deref(), Some("Intro"));

        let mut fields = obj.read_fields().unwrap();
        fields.insert("m_Script", "goodbye");
        obj.write_fields(&fields, None).unwrap();

        let reread = obj.read_fields().unwrap();
        assert_eq!(reread.get("m_Script").and_then(|v| v.as_str()), Some("goodbye"));
        assert_eq!(env.changed_files().len(), 1);
    }

    #[test]
    fn test_get_cab_is_case_insensitive() {
        let env = sample_env();
        assert!(env.get_cab("SharedAssets0.assets").is_some());
        assert!(env.get_cab("archive:/x/sharedassets0.assets").is_some());
        assert!(env.get_cab("missing.assets").is_none());
    }

    #[test]
    fn test_read_resource_slice() {
        let env = sample_env();
        let obj = env.objects().remove(0);
        let bytes = obj.read_resource("sharedassets0.resource", 4, 3).unwrap();
        assert_eq!(bytes, vec![4, 5, 6]);
        assert!(obj.read_resource("sharedassets0.resource", 30, 8).is_err());
    }

    #[test]
    fn test_read_resource_with_corrupt_offset() {
        let env = sample_env();
        let obj = env.objects().remove(0);
        // A negative m_Offset reaches here as a huge u64
        let offset = -8i64 as u64;
        assert!(obj.read_resource("sharedassets0.resource", offset, 16).is_err());
        assert!(obj.read_resource("sharedassets0.resource", u64::MAX, u64::MAX).is_err());
    }

    #[test]
    fn test_load_bytes_rejects_unknown_data() {
        let env = Environment::new();
        assert!(env.load_bytes("notes.txt", b"plain text".to_vec()).is_err());
        assert!(env.load_bytes("a.resS", b"plain text".to_vec()).is_ok());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("archive:/CAB-1/CAB-1.resS"), "CAB-1.resS");
        assert_eq!(base_name("plain"), "plain");
        assert_eq!(strip_transport_suffix("data.unity3d.br"), "data.unity3d");
    }
}
