//! Fixture builders for serialized files and bundles

#![allow(dead_code)]

use std::sync::Arc;
use unity_patcher_binary::bundle::{BundleEntry, BundleHeader, DirectoryNode, EntryContent};
use unity_patcher_binary::{
    BundleFile, CompressionType, Packer, ResourceFile, SerializedFile, SerializedFileBuilder, TypeTreeNode,
};

pub const CAB: &str = "CAB-4d1a";
pub const UNITY_VERSION: &str = "2021.3.5f1";

/// Flat nodes of an aligned `string` field at `level`
pub fn string_nodes(field: &str, level: i32) -> Vec<TypeTreeNode> {
    let mut string = TypeTreeNode::with_info("string", field, level);
    string.meta_flags = 0x8000;
    let mut array = TypeTreeNode::with_info("Array", "Array", level + 1);
    array.type_flags = 1;
    array.meta_flags = 0x4000;
    vec![
        string,
        array,
        TypeTreeNode::with_info("int", "size", level + 2),
        TypeTreeNode::with_info("char", "data", level + 2),
    ]
}

pub fn aligned_string(text: &str) -> Vec<u8> {
    let mut data = (text.len() as i32).to_le_bytes().to_vec();
    data.extend_from_slice(text.as_bytes());
    while data.len() % 4 != 0 {
        data.push(0);
    }
    data
}

/// TextAsset layout: m_Name, m_Script
pub fn text_asset_tree() -> TypeTreeNode {
    let mut nodes = vec![TypeTreeNode::with_info("TextAsset", "Base", 0)];
    nodes.extend(string_nodes("m_Name", 1));
    nodes.extend(string_nodes("m_Script", 1));
    TypeTreeNode::from_flat(nodes).unwrap()
}

pub fn text_asset(name: &str, script: &str) -> Vec<u8> {
    let mut data = aligned_string(name);
    data.extend(aligned_string(script));
    data
}

/// AudioClip layout: m_Name, m_Resource { m_Source, m_Offset, m_Size }
pub fn audio_clip_tree() -> TypeTreeNode {
    let mut nodes = vec![TypeTreeNode::with_info("AudioClip", "Base", 0)];
    nodes.extend(string_nodes("m_Name", 1));
    nodes.push(TypeTreeNode::with_info("StreamedResource", "m_Resource", 1));
    nodes.extend(string_nodes("m_Source", 2));
    nodes.push(TypeTreeNode::with_info("UInt64", "m_Offset", 2));
    nodes.push(TypeTreeNode::with_info("UInt64", "m_Size", 2));
    TypeTreeNode::from_flat(nodes).unwrap()
}

pub fn audio_clip(name: &str, source: &str, offset: u64, size: u64) -> Vec<u8> {
    let mut data = aligned_string(name);
    data.extend(aligned_string(source));
    data.extend(offset.to_le_bytes());
    data.extend(size.to_le_bytes());
    data
}

/// Serialized file with two TextAssets, #11 and #12
pub fn text_cab() -> SerializedFile {
    let mut builder = SerializedFileBuilder::new(CAB, UNITY_VERSION);
    let ty = builder.add_type(49, text_asset_tree());
    builder.add_object(11, ty, text_asset("dialogue_en", "Hello")).unwrap();
    builder.add_object(12, ty, text_asset("dialogue_fr", "Bonjour")).unwrap();
    builder.build()
}

/// `data.unity3d` holding [`text_cab`] and a small resource blob
pub fn text_bundle() -> Vec<u8> {
    let ress = format!("{}.resS", CAB);
    bundle("data.unity3d", text_cab(), &[(ress.as_str(), vec![0xAA; 64])])
}

/// LZ4 packed bundle with one serialized file and the given resource blobs
pub fn bundle(name: &str, cab: SerializedFile, resources: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut entries = vec![BundleEntry {
        node: DirectoryNode {
            flags: 4,
            path: cab.name().to_string(),
            ..Default::default()
        },
        content: EntryContent::Serialized(Arc::new(cab)),
    }];
    for (path, data) in resources {
        entries.push(BundleEntry {
            node: DirectoryNode {
                path: path.to_string(),
                ..Default::default()
            },
            content: EntryContent::Resource(Arc::new(ResourceFile::new(path, data.clone()))),
        });
    }
    let bundle = BundleFile::new(
        name,
        BundleHeader {
            signature: "UnityFS".to_string(),
            version: 7,
            unity_version: "5.x.x".to_string(),
            unity_revision: UNITY_VERSION.to_string(),
            ..Default::default()
        },
        CompressionType::Lz4Hc,
        entries,
    );
    bundle.to_bytes(Packer::Lz4).unwrap()
}
