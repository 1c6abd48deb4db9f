//! Unity Binary Files
//!
//! Reading and writing of the Unity containers the patcher works on:
//! - UnityFS bundles (`.bundle`, `.unity3d`, `data.unity3d`)
//! - Serialized files (`.assets`, `CAB-*` bundle entries)
//! - Resource blobs (`.resS`, `.resource`)
//!
//! Objects are decoded to [`UnityValue`](unity_patcher_core::UnityValue)
//! trees through their TypeTree and written back through the same tree.
//! The [`Environment`] ties loaded files together and hands out
//! [`ObjectHandle`]s.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use unity_patcher_binary::Environment;
//!
//! let env = Environment::new();
//! env.load_file(Path::new("Game_Data/sharedassets0.assets"))?;
//! for object in env.objects() {
//!     println!("{} #{}", object.type_name(), object.path_id());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod bundle;
pub mod compression;
pub mod environment;
pub mod error;
pub mod mesh;
pub mod reader;
pub mod resource;
pub mod serialized_file;
pub mod sprite;
pub mod texture;
pub mod typetree;
pub mod unity_version;
pub mod writer;

pub use bundle::{BundleFile, Packer};
pub use compression::CompressionType;
pub use environment::{EnvFile, Environment, ObjectHandle, PPtr, ScriptInfo, base_name};
pub use error::{BinaryError, Result};
pub use reader::{BinaryReader, ByteOrder};
pub use resource::ResourceFile;
pub use serialized_file::{ObjectInfo, SerializedFile, SerializedFileBuilder};
pub use texture::TextureFormat;
pub use typetree::{TypeTreeNode, read_typetree, write_typetree};
pub use unity_version::UnityVersion;
pub use writer::BinaryWriter;
