//! Unity Patcher CLI
//!
//! Command-line interface for exporting Unity assets and packing patch
//! files back into the game.

use anyhow::{Context as _, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use unity_patcher::{
    AssetTypeArgs, Context, ExportMode, GameLoader, GroupOption, PackOptions, PatchCatalog, Patcher, SearchOptions,
    Settings, UnpackOptions, runtime, smart_patching,
};
use unity_patcher_binary::Packer;
use unity_patcher_binary::texture::CompressionQuality;

#[derive(Parser)]
#[command(name = "unity_patcher")]
#[command(about = "Export Unity assets to patch files and pack edited patch files back into the game")]
#[command(version)]
#[command(after_help = "Examples of usage:\n  unity_patcher unpack --texture -c Text -i ./Game_Data/ -o ./ExtractedAssets/\n  unity_patcher pack ./Patches/ --outsamedir\n  unity_patcher search 'example text' --export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract Unity assets
    Unpack(UnpackArgs),
    /// Pack modified assets back into Unity files
    Pack(PackArgs),
    /// Search text within Unity assets
    Search(SearchArgs),
}

#[derive(Args, Debug, Clone)]
struct SharedArgs {
    /// Folder containing the game files. Default: the first *_Data folder here
    #[arg(short = 'i', long = "input_folder")]
    game_folder: Option<PathBuf>,

    /// Folders to skip (full paths, paths relative to the game folder, or names)
    #[arg(long, num_args = 0..)]
    blacklist: Vec<String>,

    /// Path to the Managed folder with pre-generated type layouts
    #[arg(long = "managed")]
    managed_path: Option<PathBuf>,

    /// Unity version used when files carry none. Example: 2021.3.7f1
    #[arg(long = "fallback_version", default_value = "2.5.0f5")]
    fallback_version: String,

    /// Folder containing ffmpeg, ffprobe and FSB5.Converter
    #[arg(long = "tools")]
    tools_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(long)]
    debug: bool,
}

#[derive(Args, Debug, Clone)]
struct UnpackArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Maximum number of threads. Default: number of CPU cores
    #[arg(long, num_args = 0..=1, default_missing_value = "0")]
    threads: Option<usize>,

    /// Folder where extracted assets are saved
    #[arg(short = 'o', long = "output_folder", default_value = "Patcher_Assets")]
    output_folder: PathBuf,

    #[command(flatten)]
    types: AssetTypeArgs,

    /// How exported assets are grouped
    #[arg(short = 'g', long = "group", value_enum, default_value = "type", num_args = 0..=1, default_missing_value = "type")]
    group_option: GroupOption,

    /// Asset export mode
    #[arg(short = 'm', long = "mode", value_enum, default_value = "normal")]
    export_mode: ExportMode,

    /// MonoBehaviour classes to extract. Example: -c PlayerController EnemyAI
    #[arg(short = 'c', long = "classes", num_args = 1..)]
    mono_classes: Vec<String>,

    /// Path ids of the assets to extract. Example: --id 123 456
    #[arg(long = "id", num_args = 1.., allow_negative_numbers = true)]
    asset_ids: Vec<i64>,

    /// Extract all assets
    #[arg(long = "all")]
    unpack_all: bool,
}

#[derive(Args, Debug, Clone)]
struct PackArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Folder containing the patch files
    patch_folder: PathBuf,

    /// Maximum number of threads. Default: 1
    #[arg(long, num_args = 0..=1, default_missing_value = "1")]
    threads: Option<usize>,

    /// Folder where packed files are saved. Ignored with --outsamedir
    #[arg(short = 'o', long = "output_folder", default_value = "Patcher_Result")]
    output_folder: PathBuf,

    /// Texture compression quality (fast, balanced, best)
    #[arg(long = "tex_quality", default_value = "best")]
    texture_compression_quality: CompressionQuality,

    /// Generate mipmaps for textures
    #[arg(long = "tex_mips")]
    generate_mipmaps: bool,

    /// Don't compress textures before packing
    #[arg(long = "raw_texture")]
    dont_compress_texture: bool,

    /// Transcode videos before packing
    #[arg(long = "transcode")]
    transcode_video: bool,

    /// Video transcoding quality
    #[arg(long = "transcode_quality", default_value = "medium", value_parser = ["low", "medium", "high"])]
    transcode_quality: String,

    /// Don't convert audio to FSB5 before packing
    #[arg(long = "raw_audio")]
    dont_compress_audio: bool,

    /// Append audio and video to the end of the resource file instead of
    /// replacing the original data
    #[arg(long = "res_append")]
    resource_append_mode: bool,

    /// Pack audio and video into a separate resource file (not for bundles)
    #[arg(long = "custom_res", default_value = "")]
    custom_res: String,

    #[command(flatten)]
    types: AssetTypeArgs,

    /// Save packed files in the game folder, replacing the originals
    #[arg(long)]
    outsamedir: bool,

    /// Bundle compression (none, original, lz4, lzma)
    #[arg(long = "packer", default_value = "original")]
    packer: Packer,

    /// Ignore the object names in patch file names
    #[arg(long = "ignore_name")]
    ignore_object_name: bool,

    /// Skip patch files that haven't changed since the previous pack
    #[arg(long = "smart")]
    smart_mode: bool,

    /// Load the entire game folder
    #[arg(long = "load_all")]
    load_all_files: bool,

    /// Recreate the output folder (not when packing into the game folder)
    #[arg(long = "recreate")]
    recreate_output_dir: bool,

    /// Back up each modified file once into BACKUP before saving
    #[arg(long = "backup")]
    backup_before_saving: bool,
}

#[derive(Args, Debug, Clone)]
struct SearchArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Text to search for, or a text file searched line by line
    search_text: String,

    /// Destination folder for exported hits
    #[arg(short = 'o', long = "output_folder", default_value = "Patcher_Assets")]
    output_folder: PathBuf,

    /// Maximum number of threads. Default: number of CPU cores
    #[arg(long, num_args = 0..=1, default_missing_value = "0")]
    threads: Option<usize>,

    /// Write the found assets to search_log.txt
    #[arg(long = "log")]
    log_found_assets: bool,

    /// Case-sensitive search
    #[arg(long = "case_sensitive")]
    case_sensitive_search: bool,

    /// Search all objects, not just TextAsset and MonoBehaviour
    #[arg(long = "entire_search")]
    entire_search: bool,

    /// Match whole words only
    #[arg(long = "whole_string")]
    whole_string: bool,

    /// Export the assets where text was found
    #[arg(long = "export", value_enum, num_args = 0..=1, default_missing_value = "normal")]
    export_mode: Option<ExportMode>,

    /// How exported assets are grouped
    #[arg(short = 'g', long = "group", value_enum, default_value = "type", num_args = 0..=1, default_missing_value = "type")]
    group_option: GroupOption,
}

impl Commands {
    fn shared(&self) -> &SharedArgs {
        match self {
            Commands::Unpack(args) => &args.shared,
            Commands::Pack(args) => &args.shared,
            Commands::Search(args) => &args.shared,
        }
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// First `*_Data` folder of the working directory
fn find_game_folder() -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(".")
        .context("Failed to read the working directory")?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().ends_with("_Data"))
        })
        .collect();
    candidates.sort();
    match candidates.into_iter().next() {
        Some(folder) => Ok(folder),
        None => bail!("Game folder not found: pass it with -i or run from the folder that contains *_Data"),
    }
}

fn base_settings(shared: &SharedArgs) -> Result<Settings> {
    let game_folder = match &shared.game_folder {
        Some(folder) => folder.clone(),
        None => find_game_folder()?,
    };
    Ok(Settings {
        game_folder,
        blacklist: shared.blacklist.clone(),
        debug_mode: shared.debug,
        fallback_version: shared.fallback_version.clone(),
        managed_path: shared.managed_path.clone(),
        tools_dir: shared.tools_dir.clone(),
        ..Default::default()
    })
}

fn start(settings: Settings) -> Result<(Arc<Settings>, Arc<GameLoader>, Arc<Context>)> {
    let settings = Arc::new(settings);
    if settings.debug_mode {
        tracing::debug!("Settings:\n{}", settings.to_json());
    }
    runtime::ensure_initialized(&settings).context("Failed to initialize the runtime")?;
    let loader = GameLoader::new(settings.clone())
        .with_context(|| format!("Failed to open {}", settings.game_folder.display()))?;
    let ctx = Arc::new(Context::new(settings.clone()));
    Ok((settings, loader, ctx))
}

fn unpack_command(args: UnpackArgs) -> Result<()> {
    let mut asset_types = args.types.asset_types();
    if args.unpack_all && !asset_types.iter().any(|t| t == "SDF") {
        asset_types.push("SDF".to_string());
    }
    let settings = Settings {
        output_folder: args.output_folder.clone(),
        asset_types,
        group_option: args.group_option,
        ..base_settings(&args.shared)?
    };
    let (_, loader, ctx) = start(settings)?;
    loader.load_game()?;

    let options = UnpackOptions {
        asset_ids: args.asset_ids,
        mono_classes: args.mono_classes,
        mode: args.export_mode,
        threads: args.threads,
        unpack_all: args.unpack_all,
    };
    Patcher::new(loader, ctx).unpack(&options)?;
    Ok(())
}

fn pack_command(args: PackArgs) -> Result<()> {
    let base = base_settings(&args.shared)?;
    let output_folder = if args.outsamedir {
        base.game_folder.clone()
    } else {
        args.output_folder.clone()
    };
    let settings = Settings {
        output_folder: output_folder.clone(),
        asset_types: args.types.asset_types(),
        custom_res: args.custom_res,
        ignore_object_name: args.ignore_object_name,
        transcode_video: args.transcode_video,
        transcode_quality: args.transcode_quality,
        texture_compression_quality: args.texture_compression_quality,
        generate_mipmaps: args.generate_mipmaps,
        dont_compress_texture: args.dont_compress_texture,
        dont_compress_audio: args.dont_compress_audio,
        resource_append_mode: args.resource_append_mode,
        recreate_output_dir: args.recreate_output_dir,
        backup_before_saving: args.backup_before_saving,
        ..base
    };

    let mut catalog = PatchCatalog::scan(&args.patch_folder)
        .with_context(|| format!("Patch folder is invalid or doesn't exist: {}", args.patch_folder.display()))?;
    if args.smart_mode {
        tracing::warn!("[WARN] Smart Mode is enabled");
        catalog = smart_patching::filter_patches(&settings, catalog)?;
    }

    let (_, loader, ctx) = start(settings)?;
    if args.load_all_files {
        loader.load_game()?;
    } else {
        loader.load_cabs(&catalog.source_names())?;
    }

    let options = PackOptions {
        packer: args.packer,
        threads: args.threads.or(Some(1)),
    };
    Patcher::new(loader.clone(), ctx).pack(&catalog, &options)?;

    if args.smart_mode {
        tracing::info!("\n[INF] Updating hash data...");
        smart_patching::update_hash_data(&loader, &output_folder, &catalog.imported_patches())?;
    }
    Ok(())
}

fn search_command(args: SearchArgs) -> Result<()> {
    let settings = Settings {
        output_folder: args.output_folder.clone(),
        group_option: args.group_option,
        ..base_settings(&args.shared)?
    };
    let (_, loader, ctx) = start(settings)?;
    loader.load_game()?;

    let options = SearchOptions {
        search_text: args.search_text,
        create_log: args.log_found_assets,
        case_sensitive: args.case_sensitive_search,
        entire_search: args.entire_search,
        whole_string: args.whole_string,
        export: args.export_mode,
        threads: args.threads,
    };
    Patcher::new(loader, ctx).search(&options)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.command.shared().debug);
    tracing::info!("Unity Patcher v{}\n", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Unpack(args) => unpack_command(args),
        Commands::Pack(args) => pack_command(args),
        Commands::Search(args) => search_command(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_pack_flags() {
        let cli = Cli::try_parse_from([
            "unity_patcher",
            "pack",
            "patches",
            "-i",
            "Game_Data",
            "--packer",
            "lz4",
            "--tex_quality",
            "fast",
            "--texture",
            "--smart",
        ])
        .unwrap();
        let Commands::Pack(args) = cli.command else {
            panic!("expected pack");
        };
        assert_eq!(args.patch_folder, Path::new("patches"));
        assert_eq!(args.packer, Packer::Lz4);
        assert_eq!(args.texture_compression_quality, CompressionQuality::Fast);
        assert_eq!(args.types.asset_types(), vec!["Texture2D", "Texture2DArray"]);
        assert!(args.smart_mode);
        assert_eq!(args.threads, None);
    }

    #[test]
    fn test_parse_search_export_default() {
        let cli = Cli::try_parse_from(["unity_patcher", "search", "Sword", "--export"]).unwrap();
        let Commands::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.export_mode, Some(ExportMode::Normal));
        assert_eq!(args.output_folder, Path::new("Patcher_Assets"));
    }

    #[test]
    fn test_parse_unpack_filters() {
        let cli = Cli::try_parse_from([
            "unity_patcher", "unpack", "--id", "12", "-34", "-c", "Quest", "-m", "dump", "-g", "source_type",
        ])
        .unwrap();
        let Commands::Unpack(args) = cli.command else {
            panic!("expected unpack");
        };
        assert_eq!(args.asset_ids, vec![12, -34]);
        assert_eq!(args.mono_classes, vec!["Quest"]);
        assert_eq!(args.export_mode, ExportMode::Dump);
        assert_eq!(args.group_option, GroupOption::SourceType);
    }
}
