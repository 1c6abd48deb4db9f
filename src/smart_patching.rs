//! Incremental packing
//!
//! After a smart `pack` run, `hash_data.json` records, for every written
//! container, its SHA-256 and the hashes of the patch files applied to it:
//!
//! ```json
//! { "PATCH": { "out/level0": { "hash": "...", "patch_files": { "patches/a.png": "..." } } } }
//! ```
//!
//! The next run drops patch files that are already in an untouched output.

use crate::error::Result;
use crate::game_loader::GameLoader;
use crate::patch_file::PatchCatalog;
use crate::settings::Settings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    pub hash: String,
    #[serde(default)]
    pub patch_files: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashData {
    #[serde(rename = "PATCH", default)]
    pub patch: IndexMap<String, HashEntry>,
}

impl HashData {
    /// Empty data when the file doesn't exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }
}

/// Hex SHA-256 of a file's contents
pub fn calculate_hash(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&data)))
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Drop the patch files already applied to unchanged outputs.
///
/// An output whose hash changed loses its recorded patch files, so all of
/// them are applied again. A changed patch file keeps its place in the
/// catalog. With `smart_full_repack_when_output_differs` and an output folder
/// other than the game folder, a changed patch file returns the whole
/// catalog instead.
pub fn filter_patches(settings: &Settings, catalog: PatchCatalog) -> Result<PatchCatalog> {
    let hashes = HashData::load(&settings.hash_data_path)?;
    if hashes.is_empty() {
        return Ok(catalog);
    }

    let full_repack_on_change = settings.smart_full_repack_when_output_differs && !settings.output_is_game_folder();
    let mut updated = hashes.clone();
    let mut filtered = catalog.clone();

    for (assets_file, entry) in &hashes.patch {
        let assets_path = Path::new(assets_file);
        if !assets_path.starts_with(&settings.output_folder) {
            continue;
        }
        if !assets_path.is_file() {
            updated.patch.shift_remove(assets_file);
            continue;
        }
        if calculate_hash(assets_path)? != entry.hash {
            if let Some(entry) = updated.patch.get_mut(assets_file) {
                entry.patch_files.clear();
            }
            continue;
        }

        for (patch_path, patch_hash) in &entry.patch_files {
            let patch_path = Path::new(patch_path);
            if !patch_path.is_file() {
                continue;
            }
            if calculate_hash(patch_path)? == *patch_hash {
                filtered.remove_by_path(patch_path);
            } else if full_repack_on_change {
                tracing::info!("[INF] {} changed, packing everything", patch_path.display());
                return Ok(catalog);
            }
        }
    }

    updated.save(&settings.hash_data_path)?;
    tracing::info!(
        "[INF] Smart Mode: {} of {} patch files already applied",
        catalog.len() - filtered.len(),
        catalog.len()
    );
    Ok(filtered)
}

/// Record the written containers and the patch files imported into them
pub fn update_hash_data(loader: &GameLoader, output_folder: &Path, imported: &PatchCatalog) -> Result<()> {
    let patched_files = loader.patched_files();
    if imported.is_empty() || patched_files.is_empty() {
        return Ok(());
    }

    let hash_path = &loader.settings().hash_data_path;
    let mut hashes = HashData::load(hash_path)?;

    for file in loader.env().files() {
        let Some(dest) = loader.output_path(file.name(), output_folder) else {
            continue;
        };
        if !patched_files.contains(&dest) {
            continue;
        }

        let mut patch_files = IndexMap::new();
        for serialized in file.serialized_files() {
            for path_id in serialized.object_ids() {
                let Some(patches) = imported.lookup(serialized.name(), path_id, None, None) else {
                    continue;
                };
                for patch in patches.iter() {
                    patch_files.insert(path_key(&patch.path), calculate_hash(&patch.path)?);
                }
            }
        }

        let key = path_key(&dest);
        let mut merged = hashes
            .patch
            .get(&key)
            .map(|entry| entry.patch_files.clone())
            .unwrap_or_default();
        merged.extend(patch_files);
        hashes.patch.insert(
            key,
            HashEntry {
                hash: calculate_hash(&dest)?,
                patch_files: merged,
            },
        );
    }

    hashes.save(hash_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch_file::PatchFile;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: Settings,
        output_file: PathBuf,
        patch: PathBuf,
        other_patch: PathBuf,
    }

    fn fixture(output_is_game: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("Game_Data");
        let output = if output_is_game { game.clone() } else { dir.path().join("Patcher_Result") };
        let patches = dir.path().join("patches");
        std::fs::create_dir_all(&game).unwrap();
        std::fs::create_dir_all(&output).unwrap();
        std::fs::create_dir_all(&patches).unwrap();

        let output_file = output.join("level0");
        std::fs::write(&output_file, b"packed").unwrap();
        let patch = patches.join("Coin [level0] #10.png");
        std::fs::write(&patch, b"png").unwrap();
        let other_patch = patches.join("Gem [level0] #11.png");
        std::fs::write(&other_patch, b"png").unwrap();

        let settings = Settings {
            game_folder: game,
            output_folder: output,
            hash_data_path: dir.path().join("hash_data.json"),
            ..Default::default()
        };
        Fixture {
            _dir: dir,
            settings,
            output_file,
            patch,
            other_patch,
        }
    }

    fn record(fixture: &Fixture) {
        let mut data = HashData::default();
        data.patch.insert(
            path_key(&fixture.output_file),
            HashEntry {
                hash: calculate_hash(&fixture.output_file).unwrap(),
                patch_files: IndexMap::from([
                    (path_key(&fixture.patch), calculate_hash(&fixture.patch).unwrap()),
                    (path_key(&fixture.other_patch), calculate_hash(&fixture.other_patch).unwrap()),
                ]),
            },
        );
        data.save(&fixture.settings.hash_data_path).unwrap();
    }

    fn catalog(fixture: &Fixture) -> PatchCatalog {
        PatchCatalog::from_patches(vec![
            Arc::new(PatchFile::parse(&fixture.patch)),
            Arc::new(PatchFile::parse(&fixture.other_patch)),
        ])
    }

    #[test]
    fn test_hash_data_format() {
        let mut data = HashData::default();
        data.patch.insert(
            "out/level0".to_string(),
            HashEntry {
                hash: "ab".to_string(),
                patch_files: IndexMap::from([("p.png".to_string(), "cd".to_string())]),
            },
        );
        let json: serde_json::Value = serde_json::to_value(&data).unwrap();
        assert_eq!(json["PATCH"]["out/level0"]["hash"], "ab");
        assert_eq!(json["PATCH"]["out/level0"]["patch_files"]["p.png"], "cd");
    }

    #[test]
    fn test_calculate_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(
            calculate_hash(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_unchanged_patches_are_skipped() {
        let fixture = fixture(false);
        record(&fixture);
        let filtered = filter_patches(&fixture.settings, catalog(&fixture)).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_changed_output_repacks_everything() {
        let fixture = fixture(false);
        record(&fixture);
        std::fs::write(&fixture.output_file, b"edited by hand").unwrap();

        let filtered = filter_patches(&fixture.settings, catalog(&fixture)).unwrap();
        assert_eq!(filtered.len(), 2);
        let saved = HashData::load(&fixture.settings.hash_data_path).unwrap();
        assert!(saved.patch[&path_key(&fixture.output_file)].patch_files.is_empty());
    }

    #[test]
    fn test_changed_patch_with_separate_output() {
        let fixture = fixture(false);
        record(&fixture);
        std::fs::write(&fixture.patch, b"new png").unwrap();

        let filtered = filter_patches(&fixture.settings, catalog(&fixture)).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_changed_patch_in_place() {
        let fixture = fixture(true);
        record(&fixture);
        std::fs::write(&fixture.patch, b"new png").unwrap();

        let filtered = filter_patches(&fixture.settings, catalog(&fixture)).unwrap();
        assert_eq!(filtered.paths(), vec![fixture.patch.clone()]);
    }

    #[test]
    fn test_partial_filter_can_be_enabled_for_separate_output() {
        let mut fixture = fixture(false);
        fixture.settings.smart_full_repack_when_output_differs = false;
        record(&fixture);
        std::fs::write(&fixture.patch, b"new png").unwrap();

        let filtered = filter_patches(&fixture.settings, catalog(&fixture)).unwrap();
        assert_eq!(filtered.paths(), vec![fixture.patch.clone()]);
    }
}
