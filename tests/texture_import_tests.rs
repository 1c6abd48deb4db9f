//! Texture patches applied through the object handler

mod common;

use common::string_nodes;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use unity_patcher::{Context, ObjectHandler, PatchFile, PatchKind, Settings, Statistics};
use unity_patcher_binary::{Environment, ObjectHandle, SerializedFileBuilder, TypeTreeNode};
use unity_patcher_core::UnityValue;

const RGBA32: i32 = 4;

/// Texture2D layout with inline image data
fn texture_tree() -> TypeTreeNode {
    let mut nodes = vec![TypeTreeNode::with_info("Texture2D", "Base", 0)];
    nodes.extend(string_nodes("m_Name", 1));
    for field in ["m_Width", "m_Height", "m_CompleteImageSize", "m_TextureFormat", "m_MipCount"] {
        nodes.push(TypeTreeNode::with_info("int", field, 1));
    }
    let mut data = TypeTreeNode::with_info("TypelessData", "image data", 1);
    data.meta_flags = 0x4000;
    nodes.push(data);
    nodes.push(TypeTreeNode::with_info("int", "size", 2));
    nodes.push(TypeTreeNode::with_info("UInt8", "data", 2));
    TypeTreeNode::from_flat(nodes).unwrap()
}

fn coin_texture() -> Vec<u8> {
    let mut data = common::aligned_string("Coin");
    for value in [1i32, 1, 4, RGBA32, 1] {
        data.extend(value.to_le_bytes());
    }
    data.extend(4i32.to_le_bytes());
    data.extend([255, 0, 0, 255]);
    data
}

fn coin() -> (Arc<Environment>, ObjectHandle) {
    let mut builder = SerializedFileBuilder::new("CAB-x", common::UNITY_VERSION);
    let ty = builder.add_type(28, texture_tree());
    builder.add_object(10, ty, coin_texture()).unwrap();
    let env = Environment::new();
    env.load_bytes("CAB-x", builder.build().to_bytes().unwrap()).unwrap();
    let object = env.objects().into_iter().next().unwrap();
    (env, object)
}

fn handler() -> ObjectHandler {
    let ctx = Arc::new(Context::new(Arc::new(Settings::default())));
    ObjectHandler::new(ctx, Arc::new(Statistics::new()))
}

#[test]
fn test_png_and_dump_on_one_texture() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("Coin [CAB-x] #10.png");
    let dump = dir.path().join("Coin [CAB-x] #10.dump.json");
    RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255])).save(&png).unwrap();
    std::fs::write(&dump, r#"{ "m_Name": "Gold Coin", "m_Width": 64 }"#).unwrap();

    let regular = Arc::new(PatchFile::parse(&png));
    let dumped = Arc::new(PatchFile::parse(&dump));
    assert_eq!(regular.kind, PatchKind::Regular);
    assert_eq!(dumped.kind, PatchKind::Dump);

    let (_env, object) = coin();
    let handler = handler();
    handler.import(&object, &[regular.clone(), dumped.clone()]);
    assert_eq!(handler.statistics().success(), 2);
    assert_eq!(handler.statistics().failure(), 0);
    assert!(regular.is_imported() && dumped.is_imported());

    let tree = object.read_fields().unwrap();
    // Dump fields outside the image survive, the PNG import sets the image
    assert_eq!(tree.get("m_Name").and_then(UnityValue::as_str), Some("Gold Coin"));
    assert_eq!(tree.get("m_Width").and_then(UnityValue::to_i64), Some(2));
    assert_eq!(tree.get("m_Height").and_then(UnityValue::to_i64), Some(2));
    assert_eq!(tree.get("m_CompleteImageSize").and_then(UnityValue::to_i64), Some(16));
    assert_eq!(tree.get("m_TextureFormat").and_then(UnityValue::to_i64), Some(RGBA32 as i64));
    let pixels = tree.get("image data").and_then(UnityValue::to_bytes).unwrap();
    assert_eq!(pixels, [0u8, 255, 0, 255].repeat(4));
}

#[test]
fn test_export_png_then_import_same_image() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(Context::new(Arc::new(Settings {
        output_folder: dir.path().to_path_buf(),
        group_option: unity_patcher::GroupOption::None,
        ..Default::default()
    })));
    let handler = ObjectHandler::new(ctx, Arc::new(Statistics::new()));
    let (_env, object) = coin();
    let before = object.raw_data().unwrap();

    handler.export(&object, unity_patcher::ExportMode::Normal, false);
    let exported = dir.path().join("Coin [CAB-x] #10.png");
    assert!(exported.is_file());

    handler.import(&object, &[Arc::new(PatchFile::parse(&exported))]);
    assert_eq!(handler.statistics().success(), 2);
    assert_eq!(object.raw_data().unwrap(), before);
}

#[test]
fn test_unsupported_extension_fails_without_changes() {
    let dir = tempfile::tempdir().unwrap();
    let text = dir.path().join("Coin [CAB-x] #10.txt");
    std::fs::write(&text, "not an image").unwrap();

    let (_env, object) = coin();
    let before = object.raw_data().unwrap();
    let handler = handler();
    handler.import(&object, &[Arc::new(PatchFile::parse(&text))]);
    assert_eq!(handler.statistics().failure(), 1);
    assert_eq!(object.raw_data().unwrap(), before);
}
