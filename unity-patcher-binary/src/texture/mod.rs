//! Texture decoding and encoding
//!
//! # Examples
//!
//! ```rust,no_run
//! use unity_patcher_binary::texture::{decode_image, TextureFormat};
//! use unity_patcher_binary::unity_version::UnityVersion;
//!
//! let data = std::fs::read("texture.bin")?;
//! let image = decode_image(&data, 256, 256, TextureFormat::DXT5, &UnityVersion::default())?;
//! image.save("texture.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod decode;
pub mod encode;
pub mod formats;

pub use decode::decode_image;
pub use encode::{EncodedTexture, encode_level, encode_texture};
pub use formats::{CompressionQuality, TextureFormat, graphics_to_texture, texture_to_graphics};
