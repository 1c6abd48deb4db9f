//! Payload packing for clips streamed from resource blobs
//!
//! AudioClip (`m_Resource`) and VideoClip (`m_ExternalResources`) keep their
//! payload in a `.resS`/`.resource` blob as `(m_Source, m_Offset, m_Size)`.
//! Replacing a payload in place shifts every later payload of the same blob,
//! so the offsets of sibling clips in the same serialized file are fixed up
//! in the same pass.

use crate::classes::BaseManager;
use crate::error::{PatcherError, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use unity_patcher_binary::{EnvFile, ObjectHandle, ResourceFile, base_name};
use unity_patcher_core::{ClassIdType, UnityValue};

/// Serializes blob edits across workers. Separate from the environment save
/// lock, which object writes take on their own.
static PACK_LOCK: Mutex<()> = Mutex::new(());

const LEGACY_AUDIO_DATA: &str = "m_AudioData";

fn resource_key(class: ClassIdType) -> Option<&'static str> {
    match class {
        ClassIdType::AudioClip => Some("m_Resource"),
        ClassIdType::VideoClip => Some("m_ExternalResources"),
        _ => None,
    }
}

/// Payload of a clip: the legacy inline field, or the referenced blob range
pub fn read_payload(base: &mut BaseManager) -> Result<Option<Vec<u8>>> {
    let Some(key) = resource_key(base.object.class()) else {
        return Ok(None);
    };
    let tree = base.tree()?;
    for legacy in [LEGACY_AUDIO_DATA, "m_VideoData"] {
        if let Some(data) = tree.get(legacy).and_then(UnityValue::to_bytes) {
            return Ok(Some(data));
        }
    }
    let Some(resource) = tree.get(key) else {
        return Ok(None);
    };
    let source = resource.get("m_Source").and_then(UnityValue::as_str).unwrap_or_default();
    let size = resource.get("m_Size").and_then(UnityValue::to_i64).unwrap_or_default();
    if source.is_empty() || size <= 0 {
        return Ok(None);
    }
    let offset = resource.get("m_Offset").and_then(UnityValue::to_i64).unwrap_or_default();
    let source = source.to_string();
    Ok(Some(base.object.read_resource(&source, offset as u64, size as u64)?))
}

/// Replace `size` bytes at `offset` with `payload`; returns the size delta
pub fn splice(data: &mut Vec<u8>, offset: u64, size: u64, payload: &[u8]) -> Result<i64> {
    let start = usize::try_from(offset).map_err(|_| PatcherError::import("Resource offset out of range"))?;
    let end = start
        .checked_add(size as usize)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            PatcherError::import(format!(
                "Resource range {}+{} exceeds the blob length {}",
                offset,
                size,
                data.len()
            ))
        })?;
    data.splice(start..end, payload.iter().copied());
    Ok(payload.len() as i64 - size as i64)
}

/// Offset of a sibling after an edit at `edited`, `None` when it is unaffected
pub fn shifted_offset(offset: i64, edited: i64, delta: i64) -> Option<i64> {
    (delta != 0 && offset > edited).then_some(offset + delta)
}

/// Write `payload` for the clip behind `base`.
///
/// `tree` is the clip's field tree with any other changes already applied.
/// The resource reference is read again under the pack lock, since other
/// workers may have moved this clip's payload after `tree` was decoded;
/// only `m_Source`, `m_Offset` and `m_Size` are taken from the fresh copy.
pub fn pack(base: &mut BaseManager, mut tree: UnityValue, payload: Vec<u8>) -> Result<()> {
    let class = base.object.class();
    let key = resource_key(class).ok_or_else(|| {
        PatcherError::import("Incorrect object type. Expected AudioClip or VideoClip")
    })?;
    let _guard = PACK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    if tree.contains_key(LEGACY_AUDIO_DATA) {
        tree.insert(LEGACY_AUDIO_DATA, payload);
        return base.write_tree(tree);
    }

    let current = match base.nodes() {
        Some(nodes) => base.object.read_fields_with(nodes)?,
        None => base.object.read_fields()?,
    };
    let stored = current.get(key).cloned().unwrap_or_else(UnityValue::object);
    let source = stored
        .get("m_Source")
        .and_then(UnityValue::as_str)
        .unwrap_or_default()
        .to_string();
    let offset = stored.get("m_Offset").and_then(UnityValue::to_i64).unwrap_or_default();
    let size = stored.get("m_Size").and_then(UnityValue::to_i64).unwrap_or_default();

    let settings = base.settings();
    let custom_res = settings.custom_res.clone();
    let mut append = settings.resource_append_mode;

    let object = base.object.clone();
    let env = object.env().clone();
    let in_bundle = env.bundle_of(object.serialized_file()).is_some();
    let resource_name = if in_bundle {
        base_name(&source).to_string()
    } else if !custom_res.is_empty() {
        format!("{}.resource", custom_res)
    } else {
        source.clone()
    };
    if resource_name.is_empty() {
        return Err(PatcherError::import(format!(
            "{} has no resource file to pack into",
            base.name()
        )));
    }

    let blob = match env.get_resource(&resource_name) {
        Some(blob) => blob,
        None if in_bundle => {
            return Err(PatcherError::not_found(format!(
                "{} wasn't found in the loaded files",
                resource_name
            )));
        }
        None => {
            let blob = create_resource(&object, &resource_name, base.settings().game_folder.clone());
            append = true;
            blob
        }
    };
    if !base_name(&source).eq_ignore_ascii_case(base_name(&resource_name)) {
        append = true;
    }

    let payload_size = payload.len() as i64;
    let new_offset = if append {
        blob.edit(|data| {
            let end = data.len() as i64;
            data.extend_from_slice(&payload);
            end
        })
    } else {
        let delta = payload_size - size;
        let siblings = if delta != 0 {
            affected_siblings(&object, &source, offset)?
        } else {
            Vec::new()
        };
        blob.edit(|data| splice(data, offset as u64, size as u64, &payload))?;
        shift_siblings(siblings, offset, delta)?;
        offset
    };
    tracing::debug!(
        "Packed {} bytes into {} at {} ({})",
        payload_size,
        blob.name(),
        new_offset,
        if append { "append" } else { "replace" }
    );

    let new_source = if base_name(&source).eq_ignore_ascii_case(base_name(&resource_name)) {
        source
    } else {
        resource_name
    };
    let mut resource = tree.get(key).cloned().unwrap_or(stored);
    resource.insert("m_Source", new_source);
    resource.insert("m_Offset", new_offset);
    resource.insert("m_Size", payload_size);
    tree.insert(key, resource);
    base.write_tree(tree)
}

/// Empty blob next to the object's serialized file
fn create_resource(object: &ObjectHandle, resource_name: &str, game_folder: PathBuf) -> Arc<ResourceFile> {
    let env = object.env();
    let name = base_name(resource_name);
    let dir = env
        .path_of(object.assets_file_name())
        .and_then(|path| path.parent().map(PathBuf::from))
        .unwrap_or(game_folder);
    tracing::warn!("[WARN] {} not found, creating a new resource file", name);
    let blob = Arc::new(ResourceFile::new(name, Vec::new()));
    env.insert_at(EnvFile::Resource(blob.clone()), &dir.join(name));
    blob.mark_changed();
    blob
}

/// A clip whose payload lies past an edited range, with its decoded tree
struct Sibling {
    object: ObjectHandle,
    key: &'static str,
    tree: UnityValue,
    offset: i64,
}

/// The other clips of the same serialized file that point into `source`
/// past `edited`. Every clip is decoded before the blob is touched; one
/// that can't be read fails the whole edit.
fn affected_siblings(object: &ObjectHandle, source: &str, edited: i64) -> Result<Vec<Sibling>> {
    let env = object.env().clone();
    let mut siblings = Vec::new();
    for sibling in env.objects_in(object.serialized_file()) {
        if sibling.path_id() == object.path_id() {
            continue;
        }
        let Some(key) = resource_key(sibling.class()) else {
            continue;
        };
        let tree = sibling.read_fields().map_err(|e| {
            PatcherError::import(format!(
                "Can't read #{} to fix its payload offset: {}",
                sibling.path_id(),
                e
            ))
        })?;
        let Some(resource) = tree.get(key) else {
            continue;
        };
        if resource.get("m_Source").and_then(UnityValue::as_str) != Some(source) {
            continue;
        }
        let offset = resource.get("m_Offset").and_then(UnityValue::to_i64).unwrap_or_default();
        if offset > edited {
            siblings.push(Sibling {
                object: sibling,
                key,
                tree,
                offset,
            });
        }
    }
    Ok(siblings)
}

/// Write the shifted offsets of `siblings` back
fn shift_siblings(siblings: Vec<Sibling>, edited: i64, delta: i64) -> Result<()> {
    for mut sibling in siblings {
        let Some(shifted) = shifted_offset(sibling.offset, edited, delta) else {
            continue;
        };
        if let Some(resource) = sibling.tree.get_mut(sibling.key) {
            resource.insert("m_Offset", shifted);
        }
        sibling.object.write_fields(&sibling.tree, None).map_err(|e| {
            PatcherError::import(format!(
                "Failed to fix the payload offset of #{}: {}",
                sibling.object.path_id(),
                e
            ))
        })?;
        tracing::debug!(
            "Offset of #{} moved {} -> {}",
            sibling.object.path_id(),
            sibling.offset,
            shifted
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_grows_and_shrinks() {
        let mut data = b"aaBBBcc".to_vec();
        assert_eq!(splice(&mut data, 2, 3, b"XXXXX").unwrap(), 2);
        assert_eq!(data, b"aaXXXXXcc");
        assert_eq!(splice(&mut data, 2, 5, b"y").unwrap(), -4);
        assert_eq!(data, b"aaycc");
    }

    #[test]
    fn test_splice_out_of_range() {
        let mut data = vec![0u8; 4];
        assert!(splice(&mut data, 2, 3, b"z").is_err());
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn test_shifted_offset() {
        assert_eq!(shifted_offset(100, 10, 5), Some(105));
        assert_eq!(shifted_offset(100, 10, -20), Some(80));
        assert_eq!(shifted_offset(10, 10, 5), None);
        assert_eq!(shifted_offset(4, 10, 5), None);
        assert_eq!(shifted_offset(100, 10, 0), None);
    }
}
