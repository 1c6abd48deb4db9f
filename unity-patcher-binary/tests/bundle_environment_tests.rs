//! Bundles loaded through an Environment, edited and saved again

use pretty_assertions::assert_eq;
use std::sync::Arc;
use unity_patcher_binary::bundle::{BundleEntry, BundleHeader, DirectoryNode, EntryContent};
use unity_patcher_binary::{
    BundleFile, CompressionType, EnvFile, Environment, Packer, ResourceFile, SerializedFile,
    SerializedFileBuilder, TypeTreeNode,
};
use unity_patcher_core::UnityValue;

/// TextAsset layout: m_Name, m_Script
fn text_asset_tree() -> TypeTreeNode {
    let mut nodes = vec![TypeTreeNode::with_info("TextAsset", "Base", 0)];
    for field in ["m_Name", "m_Script"] {
        let mut string = TypeTreeNode::with_info("string", field, 1);
        string.meta_flags = 0x8000;
        let mut array = TypeTreeNode::with_info("Array", "Array", 2);
        array.type_flags = 1;
        array.meta_flags = 0x4000;
        nodes.push(string);
        nodes.push(array);
        nodes.push(TypeTreeNode::with_info("int", "size", 3));
        nodes.push(TypeTreeNode::with_info("char", "data", 3));
    }
    TypeTreeNode::from_flat(nodes).unwrap()
}

fn aligned_string(text: &str) -> Vec<u8> {
    let mut data = (text.len() as i32).to_le_bytes().to_vec();
    data.extend_from_slice(text.as_bytes());
    while data.len() % 4 != 0 {
        data.push(0);
    }
    data
}

fn text_asset(name: &str, script: &str) -> Vec<u8> {
    let mut data = aligned_string(name);
    data.extend(aligned_string(script));
    data
}

fn game_bundle() -> Vec<u8> {
    let mut builder = SerializedFileBuilder::new("CAB-4d1a", "2021.3.5f1");
    let ty = builder.add_type(49, text_asset_tree());
    builder
        .add_object(11, ty, text_asset("dialogue_en", "Hello"))
        .unwrap();
    builder
        .add_object(12, ty, text_asset("dialogue_fr", "Bonjour"))
        .unwrap();
    let cab: SerializedFile = builder.build();

    let bundle = BundleFile::new(
        "data.unity3d",
        BundleHeader {
            signature: "UnityFS".to_string(),
            version: 7,
            unity_version: "5.x.x".to_string(),
            unity_revision: "2021.3.5f1".to_string(),
            ..Default::default()
        },
        CompressionType::Lz4Hc,
        vec![
            BundleEntry {
                node: DirectoryNode {
                    flags: 4,
                    path: "CAB-4d1a".to_string(),
                    ..Default::default()
                },
                content: EntryContent::Serialized(Arc::new(cab)),
            },
            BundleEntry {
                node: DirectoryNode {
                    path: "CAB-4d1a.resS".to_string(),
                    ..Default::default()
                },
                content: EntryContent::Resource(Arc::new(ResourceFile::new(
                    "CAB-4d1a.resS",
                    (0..=255u8).cycle().take(1024).collect(),
                ))),
            },
        ],
    );
    bundle.to_bytes(Packer::Lz4).unwrap()
}

#[test]
fn test_objects_inside_bundle() {
    let env = Environment::new();
    let file = env.load_bytes("data.unity3d", game_bundle()).unwrap();
    assert!(matches!(file, EnvFile::Bundle(_)));

    let objects = env.objects();
    assert_eq!(objects.len(), 2);
    let first = &objects[0];
    assert_eq!(first.type_name(), "TextAsset");
    assert_eq!(first.assets_file_name(), "CAB-4d1a");
    assert_eq!(first.full_source_name(), "data.unity3d/CAB-4d1a");
    assert_eq!(first.peek_name().as_deref(), Some("dialogue_en"));

    let cab = env.get_cab("archive:/CAB-4d1a/CAB-4d1a").unwrap();
    assert!(env.shares_container(&cab, "CAB-4d1a.resS"));
    let slice = first.read_resource("archive:/CAB-4d1a/CAB-4d1a.resS", 256, 4).unwrap();
    assert_eq!(slice, vec![0, 1, 2, 3]);
}

#[test]
fn test_edit_and_save_bundle() {
    let env = Environment::new();
    env.load_bytes("data.unity3d", game_bundle()).unwrap();
    assert!(env.changed_files().is_empty());

    let object = env
        .objects()
        .into_iter()
        .find(|o| o.path_id() == 12)
        .unwrap();
    let mut fields = object.read_fields().unwrap();
    fields.insert("m_Script", "Salut tout le monde");
    object.write_fields(&fields, None).unwrap();

    let changed = env.changed_files();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].name(), "data.unity3d");
    let saved = changed[0].to_bytes(Packer::Original).unwrap();

    let reloaded = Environment::new();
    reloaded.load_bytes("data.unity3d", saved).unwrap();
    let scripts: Vec<UnityValue> = reloaded
        .objects()
        .iter()
        .map(|o| o.read_fields().unwrap().get("m_Script").cloned().unwrap())
        .collect();
    assert_eq!(scripts[0].as_str(), Some("Hello"));
    assert_eq!(scripts[1].as_str(), Some("Salut tout le monde"));
}

#[test]
fn test_lzma_packer_keeps_resources() {
    let env = Environment::new();
    env.load_bytes("data.unity3d", game_bundle()).unwrap();
    let EnvFile::Bundle(bundle) = env.get("data.unity3d").unwrap() else {
        panic!("expected a bundle");
    };
    let blob = bundle.resources().next().unwrap().clone();
    blob.replace(vec![7u8; 64]);
    assert!(bundle.is_changed());

    let saved = bundle.to_bytes(Packer::Lzma).unwrap();
    let reloaded = BundleFile::from_bytes("data.unity3d", &saved).unwrap();
    assert_eq!(reloaded.block_compression(), CompressionType::Lzma);
    assert_eq!(reloaded.resources().next().unwrap().bytes(), vec![7u8; 64]);
}

#[test]
fn test_dependency_from_search_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("extra.resS"), vec![3u8; 8]).unwrap();

    let env = Environment::new();
    assert!(env.get_resource("extra.resS").is_none());
    env.add_search_dir(dir.path());
    let blob = env.get_resource("archive:/CAB-9/extra.resS").unwrap();
    assert_eq!(blob.bytes(), vec![3u8; 8]);
    assert_eq!(env.path_of("extra.resS"), Some(dir.path().join("extra.resS")));
}
