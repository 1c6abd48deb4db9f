//! Run configuration
//!
//! Built once from the command line and shared as `Arc<Settings>`. Nothing
//! mutates it after startup.

use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use unity_patcher_binary::texture::CompressionQuality;
use unity_patcher_binary::UnityVersion;

/// How exported files are laid out under the output folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GroupOption {
    #[value(name = "none")]
    None,
    #[default]
    #[value(name = "type")]
    Type,
    #[value(name = "source")]
    Source,
    #[value(name = "source_type")]
    SourceType,
    #[value(name = "type_source")]
    TypeSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub game_folder: PathBuf,
    pub output_folder: PathBuf,
    pub asset_types: Vec<String>,
    pub custom_res: String,

    // General
    pub blacklist: Vec<String>,
    pub debug_mode: bool,
    pub temp_path: PathBuf,
    pub fallback_version: String,
    pub managed_path: Option<PathBuf>,
    pub tools_dir: Option<PathBuf>,

    // Packing
    pub ignore_object_name: bool,
    pub transcode_video: bool,
    pub transcode_quality: String,
    pub texture_compression_quality: CompressionQuality,
    pub generate_mipmaps: bool,
    pub dont_compress_texture: bool,
    pub dont_compress_audio: bool,
    pub resource_append_mode: bool,
    pub recreate_output_dir: bool,
    pub backup_before_saving: bool,
    pub backup_folder: PathBuf,
    pub hash_data_path: PathBuf,
    /// Smart packing: when the output folder is not the game folder, a
    /// changed patch file forces a full repack instead of a partial one
    pub smart_full_repack_when_output_differs: bool,

    // Unpacking
    pub group_option: GroupOption,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            game_folder: PathBuf::new(),
            output_folder: PathBuf::new(),
            asset_types: Vec::new(),
            custom_res: String::new(),
            blacklist: Vec::new(),
            debug_mode: false,
            temp_path: PathBuf::from("_TEMP"),
            fallback_version: "2.5.0f5".to_string(),
            managed_path: None,
            tools_dir: None,
            ignore_object_name: false,
            transcode_video: false,
            transcode_quality: "medium".to_string(),
            texture_compression_quality: CompressionQuality::Best,
            generate_mipmaps: false,
            dont_compress_texture: false,
            dont_compress_audio: false,
            resource_append_mode: false,
            recreate_output_dir: false,
            backup_before_saving: false,
            backup_folder: PathBuf::from("BACKUP"),
            hash_data_path: PathBuf::from("hash_data.json"),
            smart_full_repack_when_output_differs: true,
            group_option: GroupOption::Type,
        }
    }
}

impl Settings {
    /// Version used for files that carry a stripped (`0.0.0`) version
    pub fn fallback_unity_version(&self) -> UnityVersion {
        self.fallback_version
            .parse()
            .unwrap_or_else(|_| UnityVersion::new(2, 5, 0))
    }

    /// Whether packed files go straight back into the game folder
    pub fn output_is_game_folder(&self) -> bool {
        same_path(&self.game_folder, &self.output_folder)
    }

    /// Effective configuration as pretty JSON, for `--debug`
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Compare two paths after canonicalization, falling back to the raw text
pub fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.temp_path, PathBuf::from("_TEMP"));
        assert_eq!(settings.group_option, GroupOption::Type);
        assert_eq!(settings.texture_compression_quality, CompressionQuality::Best);
        assert_eq!(settings.fallback_unity_version().major, 2);
        assert!(settings.smart_full_repack_when_output_differs);
    }

    #[test]
    fn test_settings_as_json() {
        let settings = Settings {
            group_option: GroupOption::SourceType,
            ..Default::default()
        };
        let json: serde_json::Value = serde_json::from_str(&settings.to_json()).unwrap();
        assert_eq!(json["group_option"], "source_type");
        assert_eq!(json["texture_compression_quality"], "best");
    }
}
