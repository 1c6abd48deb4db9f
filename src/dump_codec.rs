//! JSON dumps of object field trees
//!
//! Dumps are pretty JSON with two string encodings for bulky data: byte
//! blobs become `BYTES: <base64(zlib)>` and long lists of small integers
//! (`UInt8` arrays) become `LIST: <base64(zlib)>`.

use crate::error::{PatcherError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};
use std::path::Path;
use unity_patcher_core::UnityValue;

pub const BYTES_PREFIX: &str = "BYTES: ";
pub const LIST_PREFIX: &str = "LIST: ";

/// Integer lists at most this long are left as JSON arrays
const LIST_THRESHOLD: usize = 150;

fn compress(data: &[u8]) -> Result<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(STANDARD.encode(encoder.finish()?))
}

fn decompress(text: &str) -> Result<Vec<u8>> {
    let compressed = STANDARD
        .decode(text)
        .map_err(|e| PatcherError::import(format!("Invalid base64: {}", e)))?;
    let mut data = Vec::new();
    ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut data)?;
    Ok(data)
}

fn small_int_list(items: &[UnityValue]) -> Option<Vec<u8>> {
    if items.len() <= LIST_THRESHOLD {
        return None;
    }
    items
        .iter()
        .map(|item| match item {
            UnityValue::Integer(i) => u8::try_from(*i).ok(),
            _ => None,
        })
        .collect()
}

/// Replace byte blobs and long byte lists with their prefixed encodings
pub fn encode_tree(tree: &UnityValue) -> Result<UnityValue> {
    Ok(match tree {
        UnityValue::Bytes(data) => UnityValue::String(format!("{}{}", BYTES_PREFIX, compress(data)?)),
        UnityValue::Array(items) => match small_int_list(items) {
            Some(bytes) => UnityValue::String(format!("{}{}", LIST_PREFIX, compress(&bytes)?)),
            None => UnityValue::Array(items.iter().map(encode_tree).collect::<Result<_>>()?),
        },
        UnityValue::Object(fields) => UnityValue::Object(
            fields
                .iter()
                .map(|(key, value)| Ok((key.clone(), encode_tree(value)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

/// Reverse [`encode_tree`]. Strings that fail to decode are kept as is.
pub fn decode_tree(tree: UnityValue) -> UnityValue {
    match tree {
        UnityValue::String(text) => {
            if let Some(encoded) = text.strip_prefix(BYTES_PREFIX) {
                match decompress(encoded) {
                    Ok(data) => UnityValue::Bytes(data),
                    Err(e) => {
                        tracing::error!("Error decoding {}: {}", BYTES_PREFIX.trim_end(), e);
                        UnityValue::String(text)
                    }
                }
            } else if let Some(encoded) = text.strip_prefix(LIST_PREFIX) {
                match decompress(encoded) {
                    Ok(data) => UnityValue::Array(data.into_iter().map(|b| UnityValue::Integer(b as i64)).collect()),
                    Err(e) => {
                        tracing::error!("Error decoding {}: {}", LIST_PREFIX.trim_end(), e);
                        UnityValue::String(text)
                    }
                }
            } else {
                UnityValue::String(text)
            }
        }
        UnityValue::Array(items) => UnityValue::Array(items.into_iter().map(decode_tree).collect()),
        UnityValue::Object(fields) => {
            UnityValue::Object(fields.into_iter().map(|(k, v)| (k, decode_tree(v))).collect())
        }
        other => other,
    }
}

/// Pretty JSON, two space indent, non-ASCII characters kept
pub fn to_json(tree: &UnityValue) -> Result<String> {
    Ok(serde_json::to_string_pretty(&encode_tree(tree)?)?)
}

/// Parse a dump and decode its prefixed strings
pub fn from_json(text: &str) -> Result<UnityValue> {
    let tree: UnityValue = serde_json::from_str(text)?;
    let tree = decode_tree(tree);
    if tree.as_object().is_none() {
        return Err(PatcherError::import(format!(
            "Tree must be an object, not {}",
            tree.kind()
        )));
    }
    Ok(tree)
}

pub fn write_dump(dest: &Path, tree: &UnityValue) -> Result<()> {
    if tree.as_object().is_none() {
        return Err(PatcherError::export(format!(
            "Expected an object tree, got {}",
            tree.kind()
        )));
    }
    crate::classes::save_file(dest, to_json(tree)?.as_bytes())
}

/// Read a `.json` dump from disk
pub fn read_dump(path: &Path) -> Result<UnityValue> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if !is_json {
        return Err(PatcherError::import(format!(
            "Invalid file. Expected .json, got {}",
            path.display()
        )));
    }
    from_json(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_tree() -> UnityValue {
        let mut tree = UnityValue::object();
        tree.insert("m_Name", "Привет");
        tree.insert("image data", vec![1u8, 2, 3, 4]);
        tree.insert(
            "m_Bytes",
            (0..200).map(|i| UnityValue::Integer(i % 256)).collect::<Vec<_>>(),
        );
        tree.insert("m_Short", vec![UnityValue::Integer(1), UnityValue::Integer(2)]);
        tree
    }

    #[test]
    fn test_encoded_prefixes() {
        let json = to_json(&sample_tree()).unwrap();
        assert!(json.contains("\"m_Name\": \"Привет\""));
        assert!(json.contains("\"image data\": \"BYTES: "));
        assert!(json.contains("\"m_Bytes\": \"LIST: "));
        assert!(json.contains("\"m_Short\": [\n"));
        assert!(json.starts_with("{\n  \"m_Name\""));
    }

    #[test]
    fn test_decode_restores_tree() {
        let tree = sample_tree();
        let decoded = from_json(&to_json(&tree).unwrap()).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_large_values_stay_lists() {
        let mut tree = UnityValue::object();
        tree.insert(
            "m_Ids",
            (0..200).map(|i| UnityValue::Integer(i * 10)).collect::<Vec<_>>(),
        );
        let encoded = encode_tree(&tree).unwrap();
        assert!(encoded.get("m_Ids").unwrap().as_array().is_some());
    }

    #[test]
    fn test_bad_payload_keeps_string() {
        let value = decode_tree(UnityValue::String("BYTES: not base64!".to_string()));
        assert_eq!(value.as_str(), Some("BYTES: not base64!"));
    }

    #[test]
    fn test_non_object_dump_rejected() {
        assert!(from_json("[1, 2, 3]").is_err());
    }
}
