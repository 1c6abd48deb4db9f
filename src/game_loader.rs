//! Game folder discovery, on-demand container loading and saving
//!
//! [`GameLoader`] owns the [`Environment`] of a run. It loads either every
//! asset file of the game folder ([`GameLoader::load_game`]) or only the
//! containers a patch set needs ([`GameLoader::load_cabs`]). Bundles found in
//! the second mode are indexed by their directory and materialized only when
//! one of their entries is asked for.
//!
//! Missing dependencies requested by workers go through
//! [`GameLoader::try_load_file`], which lets a single caller load a given
//! name while concurrent callers for the same name wait for it.

use crate::error::{PatcherError, Result};
use crate::settings::{Settings, same_path};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use unity_patcher_binary::bundle::{BundleHeader, BundleParser};
use unity_patcher_binary::{Environment, ObjectHandle, Packer, base_name};
use walkdir::WalkDir;

/// Extensions never treated as game data
pub const IGNORED_EXTENSIONS: &[&str] = &[
    ".txt", ".png", ".wav", ".srt", ".xml", ".bmp", ".mp4", ".dat", ".dll", ".jpg", ".json",
    ".manifest", ".rar", ".zip", ".7z", ".info", ".config",
];

const DATA_BUNDLE: &str = "data.unity3d";
const SHARED_ASSETS_SUFFIX: &str = ".sharedAssets";

/// Part of a file name before the first dot
fn stem(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => "",
        Some(pos) => &name[pos..],
    }
}

fn is_blacklisted_dir(root: &Path, dir: &Path, blacklist: &[String]) -> bool {
    let name = dir.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let relative = dir
        .strip_prefix(root)
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    blacklist.iter().any(|entry| {
        let entry_path = Path::new(entry);
        *entry == name
            || entry.replace('\\', "/").trim_end_matches('/') == relative
            || (entry_path.is_absolute() && same_path(entry_path, dir))
    })
}

/// Asset files under `folder`.
///
/// `globalgamemanagers*` and `data.unity3d` are always included. With
/// `allowed` set, `level*` files and `.assets`/`.resS`/`.resource` files are
/// restricted to the requested names. Everything else is included unless
/// its extension is in [`IGNORED_EXTENSIONS`]. Folders named in `blacklist`
/// (by name, path relative to `folder` or absolute path) are skipped.
pub fn find_asset_files(folder: &Path, allowed: Option<&[String]>, blacklist: &[String]) -> Result<Vec<PathBuf>> {
    let allowed = allowed.filter(|names| !names.is_empty());
    let allowed_stems: HashSet<&str> = allowed
        .unwrap_or_default()
        .iter()
        .map(|name| match name.rfind('.') {
            Some(pos) if pos > 0 => &name[..pos],
            _ => name.as_str(),
        })
        .collect();

    let walker = WalkDir::new(folder).sort_by_file_name().into_iter().filter_entry(|entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let ignored = is_blacklisted_dir(folder, entry.path(), blacklist);
        if ignored {
            tracing::info!("Ignoring blacklisted folder: {}", entry.path().display());
        }
        !ignored
    });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let ext = extension(&name);

        let include = if stem(&name).starts_with("globalgamemanagers") || name == DATA_BUNDLE {
            true
        } else if let Some(allowed) = allowed.filter(|_| name.starts_with("level")) {
            allowed.iter().any(|allowed| *allowed == name)
        } else if allowed.is_some() && matches!(ext, ".assets" | ".resS" | ".resource") {
            allowed_stems.contains(stem(&name))
        } else {
            !IGNORED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        };
        if include {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Container names as given by patch files, without `.sharedAssets` suffixes
pub fn normalize_cab_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.strip_suffix(SHARED_ASSETS_SUFFIX).unwrap_or(name).to_string())
        .filter(|name| seen.insert(name.to_ascii_lowercase()))
        .collect()
}

/// Blocks waiters until the loader of one name is done
#[derive(Debug, Default)]
struct LoadGate {
    done: Mutex<bool>,
    cond: Condvar,
}

impl LoadGate {
    fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self.cond.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn open(&self) {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }
}

/// Opens the gate and forgets it when the loading caller is done
struct GateGuard<'a> {
    gates: &'a Mutex<HashMap<String, Arc<LoadGate>>>,
    key: String,
    gate: Arc<LoadGate>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.gate.open();
    }
}

/// Bundle indexed by its directory but not parsed yet
#[derive(Debug, Clone)]
struct PendingBundle {
    entries: Vec<String>,
}

pub struct GameLoader {
    settings: Arc<Settings>,
    game_folder: PathBuf,
    env: Arc<Environment>,
    loaded_files: Mutex<Vec<PathBuf>>,
    patched_files: Mutex<Vec<PathBuf>>,
    pending_bundles: Mutex<IndexMap<PathBuf, PendingBundle>>,
    gates: Mutex<HashMap<String, Arc<LoadGate>>>,
}

impl GameLoader {
    /// Loader for `settings.game_folder`, installed as the environment's
    /// fallback for missing dependencies
    pub fn new(settings: Arc<Settings>) -> Result<Arc<Self>> {
        let game_folder = settings.game_folder.clone();
        if !game_folder.is_dir() {
            return Err(PatcherError::InvalidGameFolder(game_folder));
        }

        let env = Environment::new();
        let loader = Arc::new(Self {
            settings,
            game_folder,
            env,
            loaded_files: Mutex::new(Vec::new()),
            patched_files: Mutex::new(Vec::new()),
            pending_bundles: Mutex::new(IndexMap::new()),
            gates: Mutex::new(HashMap::new()),
        });

        let weak: Weak<Self> = Arc::downgrade(&loader);
        loader.env.set_fallback_loader(Box::new(move |name| {
            weak.upgrade().is_some_and(|loader| loader.try_load_file(name))
        }));
        Ok(loader)
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn game_folder(&self) -> &Path {
        &self.game_folder
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Every file read so far, in load order
    pub fn loaded_files(&self) -> Vec<PathBuf> {
        self.loaded_files.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Files written by the last [`save_modified_files`](Self::save_modified_files)
    pub fn patched_files(&self) -> Vec<PathBuf> {
        self.patched_files.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn objects(&self) -> Vec<ObjectHandle> {
        self.env.objects()
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.env.find_cab(name).is_some() || self.env.find_resource(name).is_some()
    }

    /// Load a file into the environment once
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let mut loaded = self.loaded_files.lock().unwrap_or_else(PoisonError::into_inner);
        let known = loaded.iter().any(|known| known == path);
        let pending = self.pending_bundles_lock().shift_remove(path).is_some();
        if known && !pending {
            return Ok(());
        }
        self.env.load_file(path)?;
        if !known {
            loaded.push(path.to_path_buf());
        }
        Ok(())
    }

    fn pending_bundles_lock(&self) -> std::sync::MutexGuard<'_, IndexMap<PathBuf, PendingBundle>> {
        self.pending_bundles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a container referenced by name: a file in the game folder or
    /// a bundle entry. Concurrent requests for one name load it once.
    pub fn try_load_file(&self, file: &str) -> bool {
        let name = base_name(file);
        if name.is_empty() {
            return false;
        }
        if self.is_loaded(name) {
            return true;
        }

        let key = name.to_ascii_lowercase();
        let (gate, leader) = {
            let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
            match gates.get(&key) {
                Some(gate) => (gate.clone(), false),
                None => {
                    let gate = Arc::new(LoadGate::default());
                    gates.insert(key.clone(), gate.clone());
                    (gate, true)
                }
            }
        };
        if !leader {
            gate.wait();
            return self.is_loaded(name);
        }

        let _guard = GateGuard {
            gates: &self.gates,
            key,
            gate,
        };
        let path = self.game_folder.join(name);
        if path.is_file() {
            tracing::info!("Loading {}...", path.display());
            match self.load_file(&path) {
                Ok(()) => return true,
                Err(e) => tracing::warn!("[WARN] Can't load {}: {}", path.display(), e),
            }
        }
        if name.len() >= 3 && name[..3].eq_ignore_ascii_case("CAB") {
            self.parse_cabs(&[name.to_string()]);
        }
        self.is_loaded(name)
    }

    /// Load every asset file of the game folder
    pub fn load_game(&self) -> Result<()> {
        tracing::info!("[INF] Loading: {}", self.game_folder.display());
        self.load_assets(None, false)?;
        Ok(())
    }

    /// Load only the containers named by `cab_names`, then report the
    /// ones that couldn't be found
    pub fn load_cabs(&self, cab_names: &[String]) -> Result<()> {
        let names = normalize_cab_names(cab_names);
        tracing::info!("[INF] Loading: {}", self.game_folder.display());
        self.load_assets(Some(&names), true)?;
        self.parse_cabs(&names);

        for name in &names {
            if !self.is_loaded(name) {
                tracing::warn!("[WARN] {} not found or is corrupted", name);
            }
        }
        Ok(())
    }

    fn load_assets(&self, names: Option<&[String]>, lazy_bundles: bool) -> Result<()> {
        let paths = find_asset_files(&self.game_folder, names, &self.settings.blacklist)?;
        for path in paths {
            let result = if lazy_bundles {
                self.load_or_index(&path)
            } else {
                self.load_file(&path)
            };
            if let Err(e) = result {
                tracing::warn!("[WARN] Can't load {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// Bundles are only indexed; everything else is loaded
    fn load_or_index(&self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        if !BundleHeader::is_bundle(&data) {
            return self.load_file(path);
        }
        let entries = BundleParser::entry_names(&data)?;
        tracing::debug!("Indexed {} ({} entries)", path.display(), entries.len());
        self.pending_bundles_lock()
            .insert(path.to_path_buf(), PendingBundle { entries });
        self.loaded_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        Ok(())
    }

    /// Materialize the indexed bundles holding any of `cab_names`.
    /// `data.unity3d` is parsed when one of its entry paths is requested,
    /// other bundles when an entry's stem matches a requested stem.
    pub fn parse_cabs(&self, cab_names: &[String]) -> bool {
        let wanted: HashSet<String> = cab_names
            .iter()
            .map(|name| stem(base_name(name)).to_ascii_lowercase())
            .collect();
        let exact: HashSet<String> = cab_names.iter().map(|name| name.to_ascii_lowercase()).collect();

        let matched: Vec<PathBuf> = self
            .pending_bundles_lock()
            .iter()
            .filter(|(path, bundle)| {
                let is_data = path.file_name().is_some_and(|name| name == DATA_BUNDLE);
                bundle.entries.iter().any(|entry| {
                    if is_data && exact.contains(&entry.to_ascii_lowercase()) {
                        return true;
                    }
                    wanted.contains(&stem(base_name(entry)).to_ascii_lowercase())
                })
            })
            .map(|(path, _)| path.clone())
            .collect();

        let mut parsed = false;
        for path in matched {
            tracing::info!("[INF] Parsing {}...", path.display());
            match self.env.load_file(&path) {
                Ok(_) => {
                    self.pending_bundles_lock().shift_remove(&path);
                    parsed = true;
                }
                Err(e) => tracing::warn!("[WARN] Can't parse {}: {}", path.display(), e),
            }
        }
        parsed
    }

    /// Where a loaded container is written under `output_folder`
    pub fn output_path(&self, file_name: &str, output_folder: &Path) -> Option<PathBuf> {
        let source = self.env.path_of(file_name)?;
        Some(output_folder.join(self.archive_path(&source)))
    }

    /// Disk path of a container relative to the game folder
    fn archive_path(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.game_folder) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf()),
        }
    }

    /// Fail when a destination file exists and can't be opened for writing
    pub fn check_overwrite_permission(&self, output_folder: &Path) -> Result<()> {
        let mut locked = Vec::new();
        for path in self.loaded_files() {
            let dest = output_folder.join(self.archive_path(&path));
            if !dest.exists() {
                continue;
            }
            if let Err(e) = OpenOptions::new().append(true).open(&dest) {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    locked.push(dest);
                }
            }
        }
        if locked.is_empty() {
            Ok(())
        } else {
            Err(PatcherError::FilesLocked(locked))
        }
    }

    /// Write every changed container under `output_folder`, keeping the
    /// game folder layout. Returns the written paths.
    pub fn save_modified_files(&self, output_folder: &Path, packer: Packer) -> Result<Vec<PathBuf>> {
        let changed = self.env.changed_files();
        if changed.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!("\n[INF] Saving modified files...");

        if self.settings.recreate_output_dir && output_folder.exists() && !same_path(output_folder, &self.game_folder)
        {
            std::fs::remove_dir_all(output_folder)?;
        }

        let mut saved = Vec::new();
        for file in changed {
            let Some(source) = self.env.path_of(file.name()) else {
                tracing::warn!("[WARN] {} has no location on disk, skipped", file.name());
                continue;
            };
            let archive_path = self.archive_path(&source);
            let dest = output_folder.join(&archive_path);
            let mut temp = dest.clone().into_os_string();
            temp.push("_new");
            let temp = PathBuf::from(temp);

            let result = (|| -> Result<()> {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                if self.settings.backup_before_saving {
                    self.backup(&source, &archive_path)?;
                }
                let data = file.to_bytes(packer)?;
                std::fs::write(&temp, data)?;
                // rename replaces an existing destination in one step
                std::fs::rename(&temp, &dest)?;
                Ok(())
            })();

            match result {
                Ok(()) => {
                    tracing::info!(" - {}", archive_path.display());
                    saved.push(dest);
                }
                Err(e) => {
                    tracing::error!("Error saving file {}: {}", dest.display(), e);
                    if temp.exists() {
                        let _ = std::fs::remove_file(&temp);
                    }
                }
            }
        }

        if saved.is_empty() {
            tracing::warn!("[WARN] No files were saved");
        } else {
            tracing::info!("[INF] Saving completed! Check output folder: {}", output_folder.display());
        }
        *self.patched_files.lock().unwrap_or_else(PoisonError::into_inner) = saved.clone();
        Ok(saved)
    }

    /// Copy the original file once; later saves keep the first backup
    fn backup(&self, source: &Path, archive_path: &Path) -> Result<()> {
        let backup = self.settings.backup_folder.join(archive_path);
        if backup.exists() || !source.is_file() {
            return Ok(());
        }
        if let Some(parent) = backup.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, &backup)?;
        tracing::info!("[INF] Backup created: {}", backup.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|path| path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_find_all_asset_files() {
        let dir = tempfile::tempdir().unwrap();
        for file in [
            "globalgamemanagers",
            "level0",
            "sharedassets0.assets",
            "sharedassets0.assets.resS",
            "readme.txt",
            "Plugins/game.dll",
            "StreamingAssets/ui.bundle",
        ] {
            touch(dir.path(), file);
        }

        let found = find_asset_files(dir.path(), None, &[]).unwrap();
        assert_eq!(
            names(dir.path(), &found),
            vec![
                "StreamingAssets/ui.bundle",
                "globalgamemanagers",
                "level0",
                "sharedassets0.assets",
                "sharedassets0.assets.resS",
            ]
        );
    }

    #[test]
    fn test_find_requested_asset_files() {
        let dir = tempfile::tempdir().unwrap();
        for file in [
            "globalgamemanagers.assets",
            "level0",
            "level1",
            "sharedassets0.assets",
            "sharedassets0.assets.resS",
            "sharedassets1.assets",
            "resources.resource",
        ] {
            touch(dir.path(), file);
        }

        let allowed = vec!["level1".to_string(), "sharedassets0.assets".to_string()];
        let found = find_asset_files(dir.path(), Some(&allowed), &[]).unwrap();
        assert_eq!(
            names(dir.path(), &found),
            vec![
                "globalgamemanagers.assets",
                "level1",
                "sharedassets0.assets",
                "sharedassets0.assets.resS",
            ]
        );
    }

    #[test]
    fn test_blacklisted_folders_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "level0");
        touch(dir.path(), "Mods/level9");
        touch(dir.path(), "StreamingAssets/Old/a.bundle");
        touch(dir.path(), "StreamingAssets/New/b.bundle");

        let blacklist = vec!["Mods".to_string(), "StreamingAssets/Old".to_string()];
        let found = find_asset_files(dir.path(), None, &blacklist).unwrap();
        assert_eq!(names(dir.path(), &found), vec!["StreamingAssets/New/b.bundle", "level0"]);
    }

    #[test]
    fn test_normalize_cab_names() {
        let names = vec![
            "CAB-abc".to_string(),
            "CAB-abc.sharedAssets".to_string(),
            "level0".to_string(),
        ];
        assert_eq!(normalize_cab_names(&names), vec!["CAB-abc", "level0"]);
    }

    #[test]
    fn test_load_gate_releases_waiters() {
        let gate = Arc::new(LoadGate::default());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || gate.wait())
            })
            .collect();
        gate.open();
        for waiter in waiters {
            waiter.join().unwrap();
        }
        gate.wait();
    }

    #[test]
    fn test_invalid_game_folder() {
        let settings = Settings {
            game_folder: PathBuf::from("/definitely/not/a/game"),
            ..Default::default()
        };
        assert!(matches!(
            GameLoader::new(Arc::new(settings)),
            Err(PatcherError::InvalidGameFolder(_))
        ));
    }

    #[test]
    fn test_unknown_name_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            game_folder: dir.path().to_path_buf(),
            ..Default::default()
        };
        let loader = GameLoader::new(Arc::new(settings)).unwrap();
        assert!(!loader.try_load_file("archive:/CAB-missing/CAB-missing"));
        assert!(loader.env().get_cab("CAB-missing").is_none());
    }
}
