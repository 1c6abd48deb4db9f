//! Unity Patcher
//!
//! Exports objects of Unity games to loosely named patch files and packs
//! edited patch files back into the game data.
//!
//! A patch file name identifies its target:
//! `Health Potion [CAB-abc123] #481.dump.json` patches object `#481` of the
//! serialized file `CAB-abc123` with a field tree dump. The
//! [`PatchCatalog`] matches patch files to loaded objects, the
//! [`ObjectHandler`] applies them through a class specific manager and the
//! [`GameLoader`] writes the changed containers back out.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unity_patcher::{Context, GameLoader, PackOptions, PatchCatalog, Patcher, Settings};
//!
//! let settings = Arc::new(Settings {
//!     game_folder: "Game_Data".into(),
//!     output_folder: "Patcher_Result".into(),
//!     ..Default::default()
//! });
//! let catalog = PatchCatalog::scan(std::path::Path::new("patches"))?;
//! let loader = GameLoader::new(settings.clone())?;
//! loader.load_cabs(&catalog.source_names())?;
//!
//! let patcher = Patcher::new(loader, Arc::new(Context::new(settings)));
//! let stats = patcher.pack(&catalog, &PackOptions::default())?;
//! println!("{} patched, {} failed", stats.success(), stats.failure());
//! # Ok::<(), unity_patcher::PatcherError>(())
//! ```

pub mod classes;
pub mod context;
pub mod dump_codec;
pub mod error;
pub mod game_loader;
pub mod object_handler;
pub mod patch_file;
pub mod patcher;
pub mod resource_packer;
pub mod runtime;
pub mod settings;
pub mod smart_patching;
pub mod text_search;
pub mod tools;
pub mod typetree_manager;
pub mod worker;

pub use context::Context;
pub use error::{PatcherError, Result};
pub use game_loader::GameLoader;
pub use object_handler::{ExportMode, ObjectHandler, Statistics};
pub use patch_file::{PatchCatalog, PatchFile, PatchKind};
pub use patcher::{AssetTypeArgs, PackOptions, Patcher, SearchOptions, UnpackOptions};
pub use settings::{GroupOption, Settings};
