//! Regular file dispatch for classes with special import rules

mod common;

use common::string_nodes;
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use unity_patcher::classes::{ManagerKind, ObjectManager};
use unity_patcher::{Context, ObjectHandler, PatchFile, Settings, Statistics};
use unity_patcher_binary::{Environment, ObjectHandle, SerializedFileBuilder, TypeTreeNode};
use unity_patcher_core::UnityValue;

const RGBA32_GRAPHICS: i64 = 4;

fn handler() -> ObjectHandler {
    let ctx = Arc::new(Context::new(Arc::new(Settings::default())));
    ObjectHandler::new(ctx, Arc::new(Statistics::new()))
}

fn load(builder: SerializedFileBuilder) -> Arc<Environment> {
    let file = builder.build();
    let env = Environment::new();
    env.load_bytes(file.name(), file.to_bytes().unwrap()).unwrap();
    env
}

fn object(env: &Arc<Environment>, path_id: i64) -> ObjectHandle {
    env.objects()
        .into_iter()
        .find(|object| object.path_id() == path_id)
        .unwrap()
}

fn png(path: &Path, color: [u8; 4]) -> Arc<PatchFile> {
    RgbaImage::from_pixel(2, 2, Rgba(color)).save(path).unwrap();
    Arc::new(PatchFile::parse(path))
}

fn named_tree(type_name: &str) -> TypeTreeNode {
    let mut nodes = vec![TypeTreeNode::with_info(type_name, "Base", 0)];
    nodes.extend(string_nodes("m_Name", 1));
    TypeTreeNode::from_flat(nodes).unwrap()
}

#[test]
fn test_export_only_classes_reject_regular_files() {
    let classes = [
        (1, 43, "Mesh", ManagerKind::Mesh),
        (2, 48, "Shader", ManagerKind::Shader),
        (3, 213, "Sprite", ManagerKind::Sprite),
        (4, 687078895, "SpriteAtlas", ManagerKind::SpriteAtlas),
    ];
    let mut builder = SerializedFileBuilder::new("CAB-m", common::UNITY_VERSION);
    for (path_id, class_id, type_name, _) in classes {
        let ty = builder.add_type(class_id, named_tree(type_name));
        builder
            .add_object(path_id, ty, common::aligned_string(type_name))
            .unwrap();
    }
    let env = load(builder);
    let dir = tempfile::tempdir().unwrap();
    let handler = handler();

    for (path_id, _, type_name, kind) in classes {
        let target = object(&env, path_id);
        assert_eq!(handler.manager_for(&target).kind(), kind);

        let before = target.raw_data().unwrap();
        let patch = png(
            &dir.path().join(format!("{} [CAB-m] #{}.png", type_name, path_id)),
            [0, 0, 0, 255],
        );
        handler.import(&target, &[patch.clone()]);
        assert!(!patch.is_imported());
        assert_eq!(target.raw_data().unwrap(), before);
    }
    assert_eq!(handler.statistics().success(), 0);
    assert_eq!(handler.statistics().failure(), 4);
}

/// Texture2DArray layout with inline image data
fn array_tree() -> TypeTreeNode {
    let mut nodes = vec![TypeTreeNode::with_info("Texture2DArray", "Base", 0)];
    nodes.extend(string_nodes("m_Name", 1));
    for field in ["m_Width", "m_Height", "m_Depth", "m_Format", "m_MipCount"] {
        nodes.push(TypeTreeNode::with_info("int", field, 1));
    }
    nodes.push(TypeTreeNode::with_info("unsigned int", "m_DataSize", 1));
    let mut data = TypeTreeNode::with_info("TypelessData", "image data", 1);
    data.meta_flags = 0x4000;
    nodes.push(data);
    nodes.push(TypeTreeNode::with_info("int", "size", 2));
    nodes.push(TypeTreeNode::with_info("UInt8", "data", 2));
    TypeTreeNode::from_flat(nodes).unwrap()
}

/// Two black 2x2 RGBA32 layers
fn layers() -> Arc<Environment> {
    let mut data = common::aligned_string("Layers");
    for value in [2i32, 2, 2, RGBA32_GRAPHICS as i32, 1] {
        data.extend(value.to_le_bytes());
    }
    data.extend(32u32.to_le_bytes());
    data.extend(32i32.to_le_bytes());
    data.extend([0u8, 0, 0, 255].repeat(8));

    let mut builder = SerializedFileBuilder::new("CAB-y", common::UNITY_VERSION);
    let ty = builder.add_type(187, array_tree());
    builder.add_object(20, ty, data).unwrap();
    load(builder)
}

#[test]
fn test_texture_array_layers_import_as_one_batch() {
    let env = layers();
    let array = object(&env, 20);
    let dir = tempfile::tempdir().unwrap();
    let red = png(&dir.path().join("Layers [CAB-y] #20_0.png"), [255, 0, 0, 255]);
    let blue = png(&dir.path().join("Layers [CAB-y] #20_1.png"), [0, 0, 255, 255]);
    assert_eq!((red.index, blue.index), (Some(0), Some(1)));

    let handler = handler();
    assert_eq!(handler.manager_for(&array).kind(), ManagerKind::Texture2DArray);
    // Layers are ordered by index, not by the order they are handed over
    handler.import(&array, &[blue.clone(), red.clone()]);
    assert_eq!(handler.statistics().success(), 1);
    assert_eq!(handler.statistics().failure(), 0);
    assert!(red.is_imported() && blue.is_imported());

    let tree = array.read_fields().unwrap();
    let mut expected = [255u8, 0, 0, 255].repeat(4);
    expected.extend([0u8, 0, 255, 255].repeat(4));
    assert_eq!(tree.get("image data").and_then(UnityValue::to_bytes), Some(expected));
    assert_eq!(tree.get("m_DataSize").and_then(UnityValue::to_i64), Some(32));
    assert_eq!(tree.get("m_Format").and_then(UnityValue::to_i64), Some(RGBA32_GRAPHICS));
    assert_eq!(tree.get("m_MipCount").and_then(UnityValue::to_i64), Some(1));
}

#[test]
fn test_texture_array_missing_layer_fails() {
    let env = layers();
    let array = object(&env, 20);
    let before = array.raw_data().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let red = png(&dir.path().join("Layers [CAB-y] #20_0.png"), [255, 0, 0, 255]);

    let handler = handler();
    handler.import(&array, &[red.clone()]);
    assert_eq!(handler.statistics().success(), 0);
    assert_eq!(handler.statistics().failure(), 1);
    assert!(!red.is_imported());
    assert_eq!(array.raw_data().unwrap(), before);
}
