//! Per-class export and import strategies
//!
//! Every supported Unity class has a manager implementing
//! [`ObjectManager`]. [`ManagerKind`] maps class ids to managers; classes
//! without a dedicated manager get the [`DefaultManager`], which works on
//! field tree dumps only.

mod audio_clip;
mod base;
mod default;
mod font;
mod mesh;
mod mono_behaviour;
mod movie_texture;
mod sdf;
mod shader;
mod sprite;
mod sprite_atlas;
mod text_asset;
mod texture2d;
mod texture2d_array;
mod video_clip;

pub use audio_clip::AudioClipManager;
pub use base::{BaseManager, fix_name};
pub use default::DefaultManager;
pub use font::FontManager;
pub use mesh::MeshManager;
pub use mono_behaviour::MonoBehaviourManager;
pub use movie_texture::MovieTextureManager;
pub use sdf::{SDF_SCRIPT, SdfManager};
pub use shader::ShaderManager;
pub use sprite::SpriteManager;
pub use sprite_atlas::SpriteAtlasManager;
pub use text_asset::TextAssetManager;
pub use texture2d::Texture2DManager;
pub use texture2d_array::Texture2DArrayManager;
pub use video_clip::VideoClipManager;

use crate::context::Context;
use crate::error::{PatcherError, Result};
use image::{ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_core::{ClassIdType, UnityValue};

/// Export and import of one object
pub trait ObjectManager: Send {
    fn base(&self) -> &BaseManager;

    fn base_mut(&mut self) -> &mut BaseManager;

    fn kind(&self) -> ManagerKind;

    /// Type specific export into `dir`, or the grouped output folder
    fn export(&mut self, dir: Option<&Path>) -> Result<()>;

    /// Type specific import of one regular patch file
    fn import(&mut self, file: &Path) -> Result<()>;

    /// Import of an ordered set of files that together make up the object
    fn import_layers(&mut self, _files: &[PathBuf]) -> Result<()> {
        Err(PatcherError::unsupported(format!(
            "{} can't be imported from several files",
            self.base().type_name()
        )))
    }

    fn export_dump(&mut self, dir: Option<&Path>) -> Result<()> {
        self.base_mut().export_dump(dir)
    }

    /// Raw object bytes as `.obj`, plus the secondary payload as `.content`
    fn export_raw(&mut self, dir: Option<&Path>) -> Result<()> {
        self.base().export_raw(dir)?;
        if let Some(content) = self.raw_content()? {
            let dest = self.base().destination(self.base().name(), ".content", dir);
            save_file(&dest, &content)?;
        }
        Ok(())
    }

    fn import_dump(&mut self, file: &Path) -> Result<()> {
        self.base_mut().import_dump(file)
    }

    /// Secondary payload (image data, audio or video bytes), if the class has one
    fn raw_content(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn import_raw_content(&mut self, _file: &Path) -> Result<()> {
        Err(PatcherError::unsupported(format!(
            "{} has no raw content to replace",
            self.base().type_name()
        )))
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    /// Class name of the script behind a MonoBehaviour
    fn script_name(&self) -> Option<String> {
        None
    }
}

/// Manager variants, one per supported class plus SDF font assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerKind {
    Default,
    Texture2D,
    Texture2DArray,
    AudioClip,
    VideoClip,
    Font,
    TextAsset,
    MonoBehaviour,
    Sdf,
    MovieTexture,
    Mesh,
    Shader,
    Sprite,
    SpriteAtlas,
}

const REGISTRY: &[(ClassIdType, ManagerKind)] = &[
    (ClassIdType::Texture2D, ManagerKind::Texture2D),
    (ClassIdType::Texture2DArray, ManagerKind::Texture2DArray),
    (ClassIdType::AudioClip, ManagerKind::AudioClip),
    (ClassIdType::VideoClip, ManagerKind::VideoClip),
    (ClassIdType::Font, ManagerKind::Font),
    (ClassIdType::TextAsset, ManagerKind::TextAsset),
    (ClassIdType::MonoBehaviour, ManagerKind::MonoBehaviour),
    (ClassIdType::MovieTexture, ManagerKind::MovieTexture),
    (ClassIdType::Mesh, ManagerKind::Mesh),
    (ClassIdType::Shader, ManagerKind::Shader),
    (ClassIdType::Sprite, ManagerKind::Sprite),
    (ClassIdType::SpriteAtlas, ManagerKind::SpriteAtlas),
];

impl ManagerKind {
    /// Registered manager for a class, `Default` when there is none
    pub fn for_class(class: ClassIdType) -> Self {
        REGISTRY
            .iter()
            .find(|(registered, _)| *registered == class)
            .map(|(_, kind)| *kind)
            .unwrap_or(ManagerKind::Default)
    }

    /// Build the manager. Fails when the object can't be decoded the way
    /// this kind needs it.
    pub fn create(self, object: ObjectHandle, ctx: Arc<Context>) -> Result<Box<dyn ObjectManager>> {
        Ok(match self {
            ManagerKind::Default => Box::new(DefaultManager::new(object, ctx)),
            ManagerKind::Texture2D => Box::new(Texture2DManager::new(object, ctx)?),
            ManagerKind::Texture2DArray => Box::new(Texture2DArrayManager::new(object, ctx)?),
            ManagerKind::AudioClip => Box::new(AudioClipManager::new(object, ctx)?),
            ManagerKind::VideoClip => Box::new(VideoClipManager::new(object, ctx)?),
            ManagerKind::Font => Box::new(FontManager::new(object, ctx)?),
            ManagerKind::TextAsset => Box::new(TextAssetManager::new(object, ctx)?),
            ManagerKind::MonoBehaviour => Box::new(MonoBehaviourManager::new(object, ctx)?),
            ManagerKind::Sdf => Box::new(SdfManager::new(object, ctx)?),
            ManagerKind::MovieTexture => Box::new(MovieTextureManager::new(object, ctx)?),
            ManagerKind::Mesh => Box::new(MeshManager::new(object, ctx)?),
            ManagerKind::Shader => Box::new(ShaderManager::new(object, ctx)?),
            ManagerKind::Sprite => Box::new(SpriteManager::new(object, ctx)?),
            ManagerKind::SpriteAtlas => Box::new(SpriteAtlasManager::new(object, ctx)?),
        })
    }
}

/// Integer field of a tree, 0 when missing
pub(crate) fn int_field(tree: &UnityValue, key: &str) -> i64 {
    tree.get(key).and_then(UnityValue::to_i64).unwrap_or_default()
}

pub(crate) fn str_field<'a>(tree: &'a UnityValue, key: &str) -> Option<&'a str> {
    tree.get(key).and_then(UnityValue::as_str)
}

/// Write `content` to `dest`, creating parent folders
pub fn save_file(dest: &Path, content: &[u8]) -> Result<()> {
    if dest.as_os_str().is_empty() {
        return Err(PatcherError::export("Invalid destination path."));
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, content)?;
    Ok(())
}

pub(crate) fn save_png(dest: &Path, image: &RgbaImage) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save_with_format(dest, ImageFormat::Png)?;
    Ok(())
}
