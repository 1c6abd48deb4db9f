//! Error types for the patcher

use std::path::PathBuf;
use thiserror::Error;
use unity_patcher_binary::BinaryError;
use unity_patcher_core::UnityAssetError;

/// Result type for patcher operations
pub type Result<T> = std::result::Result<T, PatcherError>;

/// Errors raised while exporting, importing or saving assets
#[derive(Error, Debug)]
pub enum PatcherError {
    /// Container or object level failures from the asset library
    #[error(transparent)]
    Binary(#[from] BinaryError),

    /// Field tree errors
    #[error(transparent)]
    Value(#[from] UnityAssetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// The patch folder is missing or not a directory
    #[error("Invalid patch folder: {0}")]
    InvalidPatchFolder(PathBuf),

    /// The game folder is missing or not a directory
    #[error("Invalid game folder: {0}")]
    InvalidGameFolder(PathBuf),

    /// Destination files are held open by another process
    #[error("Please close the programs in which the following files are open:\n{}", format_paths(.0))]
    FilesLocked(Vec<PathBuf>),

    #[error("{0}")]
    Import(String),

    #[error("{0}")]
    Export(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    NotFound(String),

    /// An external tool failed or is missing
    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl PatcherError {
    pub fn import<S: Into<String>>(msg: S) -> Self {
        Self::Import(msg.into())
    }

    pub fn export<S: Into<String>>(msg: S) -> Self {
        Self::Export(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn tool<T: Into<String>, S: Into<String>>(tool: T, message: S) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_files_message() {
        let err = PatcherError::FilesLocked(vec![
            PathBuf::from("out/level0"),
            PathBuf::from("out/data.unity3d"),
        ]);
        assert_eq!(
            err.to_string(),
            "Please close the programs in which the following files are open:\nout/level0\nout/data.unity3d"
        );
    }

    #[test]
    fn test_binary_error_is_transparent() {
        let err: PatcherError = BinaryError::not_found("Nodes not found: <Game.Player>").into();
        assert_eq!(err.to_string(), "Nodes not found: <Game.Player>");
    }
}
