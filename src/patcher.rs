//! The `unpack`, `pack` and `search` flows

use crate::classes::SDF_SCRIPT;
use crate::context::Context;
use crate::error::Result;
use crate::game_loader::GameLoader;
use crate::object_handler::{ExportMode, ObjectHandler, Statistics};
use crate::patch_file::PatchCatalog;
use crate::patch_file::PatchFile;
use crate::text_search::{self, SEARCH_LOG, SearchQuery};
use crate::worker;
use clap::Args;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::{ObjectHandle, Packer};
use unity_patcher_core::ClassIdType;

/// Pseudo type selecting TextMeshPro font assets
pub const SDF_TYPE: &str = "SDF";

/// Asset type selection shared by `unpack` and `pack`
#[derive(Debug, Clone, Default, Args)]
pub struct AssetTypeArgs {
    /// Asset types to process. Example: -t Texture2D Sprite TextAsset
    #[arg(short = 't', long = "types", num_args = 1..)]
    pub types: Vec<String>,
    /// Include audio assets
    #[arg(long)]
    pub audio: bool,
    /// Include texture assets
    #[arg(long)]
    pub texture: bool,
    /// Include video assets
    #[arg(long)]
    pub video: bool,
    /// Include text assets
    #[arg(long)]
    pub text: bool,
    /// Include font assets
    #[arg(long)]
    pub font: bool,
    /// Include MonoBehaviour assets
    #[arg(long)]
    pub mb: bool,
}

impl AssetTypeArgs {
    /// Explicit types plus the ones implied by the shortcut flags, sorted
    pub fn asset_types(&self) -> Vec<String> {
        let shortcuts: [(bool, &[&str]); 6] = [
            (self.audio, &["AudioClip"]),
            (self.texture, &["Texture2D", "Texture2DArray"]),
            (self.video, &["VideoClip"]),
            (self.text, &["TextAsset"]),
            (self.font, &["Font", SDF_TYPE]),
            (self.mb, &["MonoBehaviour"]),
        ];
        let mut types: BTreeSet<String> = self.types.iter().cloned().collect();
        for (enabled, names) in shortcuts {
            if enabled {
                types.extend(names.iter().map(|name| name.to_string()));
            }
        }
        types.into_iter().collect()
    }
}

fn script_class(object: &ObjectHandle) -> Option<String> {
    object.script().map(|script| script.class_name)
}

/// Select objects by type name, path id and MonoBehaviour script class.
///
/// A single kind of filter is applied on its own. Mixed filters keep
/// objects whose id matches (when ids are given) and that are either of a
/// listed type or MonoBehaviours of a listed class.
pub fn filter_objects(
    objects: &[ObjectHandle],
    asset_types: &[String],
    asset_ids: &[i64],
    mono_classes: &[String],
) -> Vec<ObjectHandle> {
    let type_matches = |object: &ObjectHandle| asset_types.iter().any(|t| *t == object.type_name());
    if !asset_ids.is_empty() && mono_classes.is_empty() && asset_types.is_empty() {
        return objects
            .iter()
            .filter(|object| asset_ids.contains(&object.path_id()))
            .cloned()
            .collect();
    }
    if !asset_types.is_empty() && asset_ids.is_empty() && mono_classes.is_empty() {
        return objects.iter().filter(|object| type_matches(object)).cloned().collect();
    }

    objects
        .iter()
        .filter(|object| {
            let is_mono = object.class() == ClassIdType::MonoBehaviour;
            let id_ok = asset_ids.is_empty() || asset_ids.contains(&object.path_id());
            let mono_ok = !is_mono
                || mono_classes.is_empty()
                || script_class(object).is_some_and(|class| mono_classes.contains(&class));
            id_ok && mono_ok && (type_matches(object) || (is_mono && !mono_classes.is_empty()))
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct UnpackOptions {
    pub asset_ids: Vec<i64>,
    pub mono_classes: Vec<String>,
    pub mode: ExportMode,
    pub threads: Option<usize>,
    pub unpack_all: bool,
}

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub packer: Packer,
    pub threads: Option<usize>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            packer: Packer::Original,
            threads: Some(1),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub search_text: String,
    pub create_log: bool,
    pub case_sensitive: bool,
    pub entire_search: bool,
    pub whole_string: bool,
    pub export: Option<ExportMode>,
    pub threads: Option<usize>,
}

pub struct Patcher {
    loader: Arc<GameLoader>,
    ctx: Arc<Context>,
}

impl Patcher {
    pub fn new(loader: Arc<GameLoader>, ctx: Arc<Context>) -> Self {
        Self { loader, ctx }
    }

    pub fn loader(&self) -> &Arc<GameLoader> {
        &self.loader
    }

    fn handler(&self) -> ObjectHandler {
        ObjectHandler::new(self.ctx.clone(), Arc::new(Statistics::new()))
    }

    /// Export the selected objects of every loaded file
    pub fn unpack(&self, options: &UnpackOptions) -> Result<Arc<Statistics>> {
        tracing::info!("\n[INF] Mode: Unpack");
        let settings = &self.ctx.settings;
        let asset_types = &settings.asset_types;
        let export_sdf = options.unpack_all || asset_types.iter().any(|t| t == SDF_TYPE);

        let objects = self.loader.objects();
        let objects = if options.unpack_all {
            objects
        } else {
            let mut mono_classes = options.mono_classes.clone();
            if asset_types.iter().any(|t| t == SDF_TYPE) {
                mono_classes.push(SDF_SCRIPT.to_string());
            }
            log_filters(asset_types, &options.asset_ids, &mono_classes);
            filter_objects(&objects, asset_types, &options.asset_ids, &mono_classes)
        };

        let handler = self.handler();
        if objects.is_empty() {
            tracing::warn!("No assets were found for the specified query");
            return Ok(handler.statistics().clone());
        }

        worker::run(objects, options.threads, |object| {
            handler.export(&object, options.mode, export_sdf)
        })?;
        let stats = handler.statistics().clone();
        stats.print_summary();
        if stats.success() > 0 {
            tracing::info!("\nCheck output folder: {}", settings.output_folder.display());
        }
        Ok(stats)
    }

    /// Import `catalog` into the loaded files and save the changed ones
    pub fn pack(&self, catalog: &PatchCatalog, options: &PackOptions) -> Result<Arc<Statistics>> {
        let settings = &self.ctx.settings;
        self.loader.check_overwrite_permission(&settings.output_folder)?;

        tracing::info!("\n[INF] Mode: Pack");
        if !settings.asset_types.is_empty() {
            tracing::info!("- Filter by Type: {}", settings.asset_types.join(", "));
        }
        let handler = self.handler();
        if catalog.is_empty() {
            tracing::warn!("No patch files found");
            return Ok(handler.statistics().clone());
        }
        catalog.display_info();

        let tasks = self.match_patches(&handler, catalog);
        worker::run(tasks, options.threads, |(object, patches)| {
            handler.import(&object, &patches)
        })?;

        let stats = handler.statistics().clone();
        stats.print_summary();
        if stats.success() > 0 {
            print_unimported_assets(catalog);
        }
        self.loader.save_modified_files(&settings.output_folder, options.packer)?;
        Ok(stats)
    }

    /// Objects with their patches, for every patched source that is loaded
    fn match_patches(&self, handler: &ObjectHandler, catalog: &PatchCatalog) -> Vec<(ObjectHandle, Vec<Arc<PatchFile>>)> {
        let settings = &self.ctx.settings;
        let env = self.loader.env();
        let mut tasks = Vec::new();

        for (source_file, path_ids) in catalog.sort_by_source() {
            let Some(cab) = env.get_cab(&source_file) else {
                continue;
            };
            for object in env.objects_in(&cab) {
                if !path_ids.contains(&object.path_id()) {
                    continue;
                }
                if !settings.asset_types.is_empty() && !settings.asset_types.contains(&object.type_name()) {
                    continue;
                }

                let manager = handler.manager_for(&object);
                let script = manager.script_name();
                let name = (!settings.ignore_object_name).then(|| manager.name().replace('@', "-"));
                let Some(patches) = catalog.lookup(
                    object.assets_file_name(),
                    object.path_id(),
                    script.as_deref(),
                    name.as_deref(),
                ) else {
                    continue;
                };
                patches.mark_detected();
                tasks.push((object, patches.iter().cloned().collect()));
            }
        }
        tasks
    }

    /// Find phrases in TextAsset and MonoBehaviour objects (or every object),
    /// then export and log the hits on request. Returns the hit count.
    pub fn search(&self, options: &SearchOptions) -> Result<usize> {
        tracing::info!("\n[INF] Mode: Search");
        let phrases = text_search::read_phrases(&options.search_text)?;
        let query = SearchQuery::new(&phrases, options.case_sensitive, options.whole_string)?;

        let objects = self.loader.objects();
        let objects = if options.entire_search {
            objects
        } else {
            let types = ["TextAsset".to_string(), "MonoBehaviour".to_string()];
            filter_objects(&objects, &types, &[], &[])
        };

        let results = text_search::search(&objects, &query, options.threads)?;
        if results.is_empty() {
            tracing::warn!("[WARN] Nothing found, check the command is correct");
            return Ok(0);
        }
        tracing::info!("[INF] {} assets found", results.len());

        let handler = self.handler();
        if let Some(mode) = options.export {
            text_search::export_results(&handler, &results, mode);
        }
        if options.create_log {
            text_search::log_results(&handler, &results, Path::new(SEARCH_LOG))?;
        }
        Ok(results.len())
    }
}

fn log_filters(asset_types: &[String], asset_ids: &[i64], mono_classes: &[String]) {
    let ids: Vec<String> = asset_ids.iter().map(i64::to_string).collect();
    let filters = [("Type", asset_types.to_vec()), ("Script", mono_classes.to_vec()), ("Id", ids)];
    if filters.iter().all(|(_, values)| values.is_empty()) {
        return;
    }
    for (name, mut values) in filters {
        if values.is_empty() {
            continue;
        }
        values.sort();
        tracing::info!("- Filter by {}: {}", name, values.join(", "));
    }
    tracing::info!("");
}

/// Warn about patch files that matched no loaded object
pub fn print_unimported_assets(catalog: &PatchCatalog) {
    let undetected = catalog.undetected();
    if undetected.is_empty() {
        return;
    }
    tracing::warn!(
        "\n[WARN] {} assets from patch folder were not found. Possible reasons: filter by type, missing unity files, invalid id/source name specified in the name of patch files (see these assets in debug mode)",
        undetected.len()
    );
    for asset in undetected {
        tracing::debug!("{} - {} - #{}:", asset.name, asset.source_file, asset.path_id);
        for file in &asset.patch_files {
            tracing::debug!("- {}", file.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_type_shortcuts() {
        let args = AssetTypeArgs {
            types: vec!["Sprite".to_string()],
            texture: true,
            font: true,
            ..Default::default()
        };
        assert_eq!(
            args.asset_types(),
            vec!["Font", "SDF", "Sprite", "Texture2D", "Texture2DArray"]
        );
    }

    #[test]
    fn test_no_types_selected() {
        assert!(AssetTypeArgs::default().asset_types().is_empty());
    }
}
