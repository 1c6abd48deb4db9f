//! Error types for Unity binary parsing and writing

use thiserror::Error;
use unity_patcher_core::UnityAssetError;

/// Result type for Unity binary operations
pub type Result<T> = std::result::Result<T, BinaryError>;

/// Errors that can occur while reading or writing Unity binary files
#[derive(Error, Debug)]
pub enum BinaryError {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// Unsupported file version
    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(String),

    /// Unsupported compression format
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Decompression failed
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// Compression failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Not enough data
    #[error("Not enough data: expected {expected}, got {actual}")]
    NotEnoughData { expected: usize, actual: usize },

    /// Invalid signature
    #[error("Invalid signature: expected {expected}, got {actual}")]
    InvalidSignature { expected: String, actual: String },

    /// Lookup of a file, object or node failed
    #[error("{0}")]
    NotFound(String),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Field tree errors
    #[error(transparent)]
    Value(#[from] UnityAssetError),
}

impl BinaryError {
    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a new unsupported version error
    pub fn unsupported_version<S: Into<String>>(version: S) -> Self {
        Self::UnsupportedVersion(version.into())
    }

    /// Create a new unsupported compression error
    pub fn unsupported_compression<S: Into<String>>(compression: S) -> Self {
        Self::UnsupportedCompression(compression.into())
    }

    /// Create a new decompression failed error
    pub fn decompression_failed<S: Into<String>>(msg: S) -> Self {
        Self::DecompressionFailed(msg.into())
    }

    /// Create a new compression failed error
    pub fn compression_failed<S: Into<String>>(msg: S) -> Self {
        Self::CompressionFailed(msg.into())
    }

    /// Create a new invalid data error
    pub fn invalid_data<S: Into<String>>(msg: S) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a new not enough data error
    pub fn not_enough_data(expected: usize, actual: usize) -> Self {
        Self::NotEnoughData { expected, actual }
    }

    /// Create a new invalid signature error
    pub fn invalid_signature<S: Into<String>>(expected: S, actual: S) -> Self {
        Self::InvalidSignature {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new lookup error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new unsupported feature error
    pub fn unsupported<S: Into<String>>(feature: S) -> Self {
        Self::Unsupported(feature.into())
    }
}

impl From<lz4_flex::block::DecompressError> for BinaryError {
    fn from(err: lz4_flex::block::DecompressError) -> Self {
        Self::decompression_failed(format!("LZ4 decompression failed: {}", err))
    }
}

impl From<lzma_rs::error::Error> for BinaryError {
    fn from(err: lzma_rs::error::Error) -> Self {
        Self::decompression_failed(format!("LZMA decompression failed: {}", err))
    }
}

impl From<image::ImageError> for BinaryError {
    fn from(err: image::ImageError) -> Self {
        Self::invalid_data(format!("Image error: {}", err))
    }
}

impl From<hound::Error> for BinaryError {
    fn from(err: hound::Error) -> Self {
        Self::invalid_data(format!("WAV error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BinaryError::invalid_format("test format");
        assert!(matches!(err, BinaryError::InvalidFormat(_)));
        assert_eq!(err.to_string(), "Invalid file format: test format");
    }

    #[test]
    fn test_not_enough_data_error() {
        let err = BinaryError::not_enough_data(100, 50);
        assert_eq!(err.to_string(), "Not enough data: expected 100, got 50");
    }

    #[test]
    fn test_not_found_keeps_message() {
        let err = BinaryError::not_found("Nodes not found: Game.Player");
        assert_eq!(err.to_string(), "Nodes not found: Game.Player");
    }

    #[test]
    fn test_value_error_is_transparent() {
        let err: BinaryError = UnityAssetError::type_conversion("string", "array").into();
        assert_eq!(err.to_string(), "Type conversion error: cannot convert string to array");
    }
}
