//! Unity class identifiers
//!
//! Maps the numeric class ids stored in serialized files to Unity type names.

use std::collections::HashMap;
use std::fmt;

/// Class ids the patcher knows by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassIdType {
    Object,
    GameObject,
    Component,
    Transform,
    Behaviour,
    Camera,
    Material,
    MeshRenderer,
    Texture,
    Texture2D,
    MeshFilter,
    Mesh,
    Shader,
    TextAsset,
    AnimationClip,
    AudioClip,
    AudioSource,
    MonoBehaviour,
    MonoScript,
    Font,
    AssetBundle,
    MovieTexture,
    PreloadData,
    RenderTexture,
    Texture2DArray,
    SpriteRenderer,
    Sprite,
    VideoClip,
    ResourceManager,
    SpriteAtlas,
    Unknown(i32),
}

/// (id, name) pairs, kept sorted by id
const KNOWN_CLASSES: &[(i32, &str, ClassIdType)] = &[
    (0, "Object", ClassIdType::Object),
    (1, "GameObject", ClassIdType::GameObject),
    (2, "Component", ClassIdType::Component),
    (4, "Transform", ClassIdType::Transform),
    (8, "Behaviour", ClassIdType::Behaviour),
    (20, "Camera", ClassIdType::Camera),
    (21, "Material", ClassIdType::Material),
    (23, "MeshRenderer", ClassIdType::MeshRenderer),
    (27, "Texture", ClassIdType::Texture),
    (28, "Texture2D", ClassIdType::Texture2D),
    (33, "MeshFilter", ClassIdType::MeshFilter),
    (43, "Mesh", ClassIdType::Mesh),
    (48, "Shader", ClassIdType::Shader),
    (49, "TextAsset", ClassIdType::TextAsset),
    (74, "AnimationClip", ClassIdType::AnimationClip),
    (82, "AudioSource", ClassIdType::AudioSource),
    (83, "AudioClip", ClassIdType::AudioClip),
    (114, "MonoBehaviour", ClassIdType::MonoBehaviour),
    (115, "MonoScript", ClassIdType::MonoScript),
    (128, "Font", ClassIdType::Font),
    (142, "AssetBundle", ClassIdType::AssetBundle),
    (147, "ResourceManager", ClassIdType::ResourceManager),
    (150, "PreloadData", ClassIdType::PreloadData),
    (152, "MovieTexture", ClassIdType::MovieTexture),
    (184, "RenderTexture", ClassIdType::RenderTexture),
    (187, "Texture2DArray", ClassIdType::Texture2DArray),
    (212, "SpriteRenderer", ClassIdType::SpriteRenderer),
    (213, "Sprite", ClassIdType::Sprite),
    (329, "VideoClip", ClassIdType::VideoClip),
    (687078895, "SpriteAtlas", ClassIdType::SpriteAtlas),
];

lazy_static::lazy_static! {
    static ref NAME_TO_CLASS: HashMap<&'static str, ClassIdType> = KNOWN_CLASSES
        .iter()
        .map(|(_, name, class)| (*name, *class))
        .collect();
}

impl ClassIdType {
    /// Resolve a numeric class id
    pub fn from_id(id: i32) -> Self {
        KNOWN_CLASSES
            .binary_search_by_key(&id, |(known, _, _)| *known)
            .map(|idx| KNOWN_CLASSES[idx].2)
            .unwrap_or(ClassIdType::Unknown(id))
    }

    /// Resolve a type name, e.g. "Texture2D"
    pub fn from_name(name: &str) -> Option<Self> {
        NAME_TO_CLASS.get(name).copied()
    }

    /// Numeric class id
    pub fn id(&self) -> i32 {
        match self {
            ClassIdType::Unknown(id) => *id,
            known => KNOWN_CLASSES
                .iter()
                .find(|(_, _, class)| class == known)
                .map(|(id, _, _)| *id)
                .unwrap_or(-1),
        }
    }

    /// Classes whose serialized layout starts with `m_Name`
    pub fn is_named_object(&self) -> bool {
        matches!(
            self,
            ClassIdType::Material
                | ClassIdType::Texture2D
                | ClassIdType::Texture2DArray
                | ClassIdType::Mesh
                | ClassIdType::Shader
                | ClassIdType::TextAsset
                | ClassIdType::AnimationClip
                | ClassIdType::AudioClip
                | ClassIdType::MonoScript
                | ClassIdType::Font
                | ClassIdType::MovieTexture
                | ClassIdType::RenderTexture
                | ClassIdType::Sprite
                | ClassIdType::VideoClip
                | ClassIdType::SpriteAtlas
                | ClassIdType::AssetBundle
        )
    }

    /// Unity type name; unknown ids render as `Class_<id>`
    pub fn name(&self) -> String {
        match self {
            ClassIdType::Unknown(id) => format!("Class_{}", id),
            known => KNOWN_CLASSES
                .iter()
                .find(|(_, _, class)| class == known)
                .map(|(_, name, _)| name.to_string())
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for ClassIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<i32> for ClassIdType {
    fn from(id: i32) -> Self {
        ClassIdType::from_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_class_lookup() {
        assert_eq!(ClassIdType::from_id(28), ClassIdType::Texture2D);
        assert_eq!(ClassIdType::from_id(687078895), ClassIdType::SpriteAtlas);
        assert_eq!(ClassIdType::VideoClip.id(), 329);
        assert_eq!(ClassIdType::from_name("AudioClip"), Some(ClassIdType::AudioClip));
    }

    #[test]
    fn test_unknown_class_name() {
        let class = ClassIdType::from_id(99999);
        assert_eq!(class, ClassIdType::Unknown(99999));
        assert_eq!(class.name(), "Class_99999");
        assert_eq!(class.id(), 99999);
        assert_eq!(ClassIdType::from_name("NotAType"), None);
    }

    #[test]
    fn test_named_objects() {
        assert!(ClassIdType::Texture2D.is_named_object());
        assert!(!ClassIdType::GameObject.is_named_object());
        assert!(!ClassIdType::MonoBehaviour.is_named_object());
    }

    #[test]
    fn test_table_sorted() {
        assert!(KNOWN_CLASSES.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
