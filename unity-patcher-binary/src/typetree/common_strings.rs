//! Unity's built-in string table for typetree blobs
//!
//! A node string offset with the high bit set indexes into this table
//! (NUL-separated, in this exact order) instead of the local buffer.

use once_cell::sync::Lazy;
use std::collections::HashMap;

const COMMON_STRINGS: &[&str] = &[
    "AABB",
    "AnimationClip",
    "AnimationCurve",
    "AnimationState",
    "Array",
    "Base",
    "BitField",
    "bitset",
    "bool",
    "char",
    "ColorRGBA",
    "Component",
    "data",
    "deque",
    "double",
    "dynamic_array",
    "FastPropertyName",
    "first",
    "float",
    "Font",
    "GameObject",
    "Generic Mono",
    "GradientNEW",
    "GUID",
    "GUIStyle",
    "int",
    "list",
    "long long",
    "map",
    "Matrix4x4f",
    "MdFour",
    "MonoBehaviour",
    "MonoScript",
    "m_ByteSize",
    "m_Curve",
    "m_EditorClassIdentifier",
    "m_EditorHideFlags",
    "m_Enabled",
    "m_ExtensionPtr",
    "m_GameObject",
    "m_Index",
    "m_IsArray",
    "m_IsStatic",
    "m_MetaFlag",
    "m_Name",
    "m_ObjectHideFlags",
    "m_PrefabInternal",
    "m_PrefabParentObject",
    "m_Script",
    "m_StaticEditorFlags",
    "m_Type",
    "m_Version",
    "Object",
    "pair",
    "PPtr<Component>",
    "PPtr<GameObject>",
    "PPtr<Material>",
    "PPtr<MonoBehaviour>",
    "PPtr<MonoScript>",
    "PPtr<Object>",
    "PPtr<Prefab>",
    "PPtr<Sprite>",
    "PPtr<TextAsset>",
    "PPtr<Texture>",
    "PPtr<Texture2D>",
    "PPtr<Transform>",
    "Prefab",
    "Quaternionf",
    "Rectf",
    "RectInt",
    "RectOffset",
    "second",
    "set",
    "short",
    "size",
    "SInt16",
    "SInt32",
    "SInt64",
    "SInt8",
    "staticvector",
    "string",
    "TextAsset",
    "TextMesh",
    "Texture",
    "Texture2D",
    "Transform",
    "TypelessData",
    "UInt16",
    "UInt32",
    "UInt64",
    "UInt8",
    "unsigned int",
    "unsigned long long",
    "unsigned short",
    "vector",
    "Vector2f",
    "Vector3f",
    "Vector4f",
    "m_ScriptingClassIdentifier",
    "Gradient",
    "Type*",
    "int2_storage",
    "int3_storage",
    "BoundsInt",
    "m_CorrespondingSourceObject",
    "m_PrefabInstance",
    "m_PrefabAsset",
    "FileSize",
    "Hash128",
    "RenderingLayerMask",
];

static BY_OFFSET: Lazy<HashMap<u32, &'static str>> = Lazy::new(|| {
    let mut offset = 0u32;
    let mut table = HashMap::with_capacity(COMMON_STRINGS.len());
    for text in COMMON_STRINGS {
        table.insert(offset, *text);
        offset += text.len() as u32 + 1;
    }
    table
});

/// Look up a common string by its offset (high bit already masked off)
pub fn common_string(offset: u32) -> Option<&'static str> {
    BY_OFFSET.get(&offset).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_offsets() {
        assert_eq!(common_string(0), Some("AABB"));
        assert_eq!(common_string(5), Some("AnimationClip"));
        assert_eq!(common_string(49), Some("Array"));
        assert_eq!(common_string(427), Some("m_Name"));
        assert_eq!(common_string(3), None);
    }
}
