//! Game folder loaded, patched from a patch folder and saved elsewhere

mod common;

use std::path::Path;
use std::sync::Arc;
use unity_patcher::smart_patching::{self, HashData};
use unity_patcher::{Context, ExportMode, GameLoader, PackOptions, PatchCatalog, Patcher, Settings, UnpackOptions};
use unity_patcher_binary::Environment;
use unity_patcher_core::UnityValue;

struct Workspace {
    _root: tempfile::TempDir,
    game: std::path::PathBuf,
    patches: std::path::PathBuf,
    output: std::path::PathBuf,
}

fn workspace() -> Workspace {
    let root = tempfile::tempdir().unwrap();
    let game = root.path().join("Game_Data");
    let patches = root.path().join("patches");
    let output = root.path().join("Patcher_Result");
    std::fs::create_dir_all(&game).unwrap();
    std::fs::create_dir_all(&patches).unwrap();
    std::fs::write(game.join("data.unity3d"), common::text_bundle()).unwrap();
    Workspace {
        _root: root,
        game,
        patches,
        output,
    }
}

fn settings(ws: &Workspace) -> Arc<Settings> {
    Arc::new(Settings {
        game_folder: ws.game.clone(),
        output_folder: ws.output.clone(),
        hash_data_path: ws.patches.join("hash_data.json"),
        ..Default::default()
    })
}

fn scripts_in(bundle: &Path) -> Vec<String> {
    let env = Environment::new();
    env.load_bytes("data.unity3d", std::fs::read(bundle).unwrap()).unwrap();
    env.objects()
        .iter()
        .map(|object| {
            let fields = object.read_fields().unwrap();
            fields.get("m_Script").and_then(UnityValue::as_str).unwrap().to_string()
        })
        .collect()
}

fn pack(settings: Arc<Settings>, catalog: &PatchCatalog) -> (Arc<GameLoader>, usize) {
    let loader = GameLoader::new(settings.clone()).unwrap();
    loader.load_cabs(&catalog.source_names()).unwrap();
    let patcher = Patcher::new(loader.clone(), Arc::new(Context::new(settings)));
    let stats = patcher.pack(catalog, &PackOptions::default()).unwrap();
    (loader, stats.success())
}

#[test]
fn test_pack_text_asset_into_bundle() {
    let ws = workspace();
    std::fs::write(ws.patches.join("dialogue_fr [CAB-4d1a] #12.txt"), "Salut").unwrap();
    let catalog = PatchCatalog::scan(&ws.patches).unwrap();
    assert_eq!(catalog.source_names(), vec!["CAB-4d1a"]);

    let (loader, success) = pack(settings(&ws), &catalog);
    assert_eq!(success, 1);
    assert!(catalog.iter().all(|patch| patch.is_imported()));

    let saved = ws.output.join("data.unity3d");
    assert_eq!(loader.patched_files(), vec![saved.clone()]);
    assert_eq!(scripts_in(&saved), vec!["Hello", "Salut"]);
    // The game folder is left alone
    assert_eq!(scripts_in(&ws.game.join("data.unity3d")), vec!["Hello", "Bonjour"]);
}

#[test]
fn test_dump_patch_merges_fields() {
    let ws = workspace();
    std::fs::write(
        ws.patches.join("dialogue_en [CAB-4d1a] #11.dump.json"),
        r#"{ "m_Script": "Howdy" }"#,
    )
    .unwrap();
    let catalog = PatchCatalog::scan(&ws.patches).unwrap();

    let (_, success) = pack(settings(&ws), &catalog);
    assert_eq!(success, 1);
    assert_eq!(scripts_in(&ws.output.join("data.unity3d")), vec!["Howdy", "Bonjour"]);
}

#[test]
fn test_wrong_name_is_not_detected() {
    let ws = workspace();
    std::fs::write(ws.patches.join("dialogue_de [CAB-4d1a] #12.txt"), "Hallo").unwrap();
    let catalog = PatchCatalog::scan(&ws.patches).unwrap();

    let (loader, success) = pack(settings(&ws), &catalog);
    assert_eq!(success, 0);
    assert!(loader.patched_files().is_empty());
    let undetected = catalog.undetected();
    assert_eq!(undetected.len(), 1);
    assert_eq!(undetected[0].path_id, 12);
    assert!(!ws.output.join("data.unity3d").exists());
}

#[test]
fn test_ignore_object_name() {
    let ws = workspace();
    std::fs::write(ws.patches.join("renamed [CAB-4d1a] #12.txt"), "Salut").unwrap();
    let catalog = PatchCatalog::scan(&ws.patches).unwrap();
    let settings = Arc::new(Settings {
        ignore_object_name: true,
        ..(*settings(&ws)).clone()
    });

    let (_, success) = pack(settings, &catalog);
    assert_eq!(success, 1);
    assert_eq!(scripts_in(&ws.output.join("data.unity3d")), vec!["Hello", "Salut"]);
}

#[test]
fn test_smart_mode_skips_applied_patches() {
    let ws = workspace();
    std::fs::write(ws.patches.join("dialogue_fr [CAB-4d1a] #12.txt"), "Salut").unwrap();
    let settings = settings(&ws);
    let catalog = PatchCatalog::scan(&ws.patches).unwrap();

    let (loader, _) = pack(settings.clone(), &catalog);
    smart_patching::update_hash_data(&loader, &settings.output_folder, &catalog.imported_patches()).unwrap();
    let data = HashData::load(&settings.hash_data_path).unwrap();
    assert_eq!(data.patch.len(), 1);

    let filtered = smart_patching::filter_patches(&settings, PatchCatalog::scan(&ws.patches).unwrap()).unwrap();
    assert!(filtered.is_empty());
}

#[test]
fn test_unpack_text_assets() {
    let ws = workspace();
    let exported = ws.patches.clone();
    let settings = Arc::new(Settings {
        output_folder: exported.clone(),
        asset_types: vec!["TextAsset".to_string()],
        group_option: unity_patcher::GroupOption::None,
        ..(*settings(&ws)).clone()
    });

    let loader = GameLoader::new(settings.clone()).unwrap();
    loader.load_game().unwrap();
    let patcher = Patcher::new(loader, Arc::new(Context::new(settings)));
    let stats = patcher
        .unpack(&UnpackOptions {
            mode: ExportMode::Normal,
            threads: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(stats.success(), 2);

    let exported_file = exported.join("dialogue_fr [CAB-4d1a] #12.txt");
    assert_eq!(std::fs::read_to_string(&exported_file).unwrap(), "Bonjour");
    assert_eq!(PatchCatalog::scan(&exported).unwrap().len(), 2);
}

#[test]
fn test_same_patches_give_same_bytes() {
    let ws = workspace();
    std::fs::write(ws.patches.join("dialogue_fr [CAB-4d1a] #12.txt"), "Salut").unwrap();
    std::fs::write(
        ws.patches.join("dialogue_en [CAB-4d1a] #11.dump.json"),
        r#"{ "m_Script": "Howdy" }"#,
    )
    .unwrap();

    let mut outputs = Vec::new();
    for folder in ["first", "second"] {
        let settings = Arc::new(Settings {
            output_folder: ws.output.join(folder),
            ..(*settings(&ws)).clone()
        });
        let catalog = PatchCatalog::scan(&ws.patches).unwrap();
        let (_, success) = pack(settings, &catalog);
        assert_eq!(success, 2);
        outputs.push(std::fs::read(ws.output.join(folder).join("data.unity3d")).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_pack_in_place_replaces_game_file() {
    let ws = workspace();
    let settings = Arc::new(Settings {
        output_folder: ws.game.clone(),
        ..(*settings(&ws)).clone()
    });

    for text in ["Salut", "Coucou"] {
        std::fs::write(ws.patches.join("dialogue_fr [CAB-4d1a] #12.txt"), text).unwrap();
        let catalog = PatchCatalog::scan(&ws.patches).unwrap();
        let (loader, success) = pack(settings.clone(), &catalog);
        assert_eq!(success, 1);
        assert_eq!(loader.patched_files(), vec![ws.game.join("data.unity3d")]);
        assert_eq!(scripts_in(&ws.game.join("data.unity3d")), vec!["Hello", text]);
    }
    assert!(!ws.game.join("data.unity3d_new").exists());
}
