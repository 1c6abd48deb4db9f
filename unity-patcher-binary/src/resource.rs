//! Resource blobs (`.resS`, `.resource`) holding streamed texture, audio
//! and video data referenced by offset from their objects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// A raw data file, standalone or inside a bundle
#[derive(Debug)]
pub struct ResourceFile {
    name: String,
    data: RwLock<Vec<u8>>,
    changed: AtomicBool,
}

impl ResourceFile {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            data: RwLock::new(data),
            changed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the full content
    pub fn bytes(&self) -> Vec<u8> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Copy of `size` bytes at `offset`, if in range
    pub fn slice(&self, offset: u64, size: u64) -> Option<Vec<u8>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(size).ok()?)?;
        data.get(start..end).map(<[u8]>::to_vec)
    }

    /// Replace the whole content and flag the blob as changed
    pub fn replace(&self, data: Vec<u8>) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
        self.mark_changed();
    }

    /// Run `edit` on the content under the write lock and flag the blob as changed
    pub fn edit<R>(&self, edit: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        let result = edit(&mut self.data.write().unwrap_or_else(PoisonError::into_inner));
        self.mark_changed();
        result
    }

    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    pub fn mark_changed(&self) {
        self.changed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_bounds() {
        let blob = ResourceFile::new("sharedassets0.resource", vec![1, 2, 3, 4]);
        assert_eq!(blob.slice(1, 2), Some(vec![2, 3]));
        assert_eq!(blob.slice(3, 2), None);
        assert!(!blob.is_changed());
    }

    #[test]
    fn test_edit_marks_changed() {
        let blob = ResourceFile::new("a.resS", Vec::new());
        let offset = blob.edit(|data| {
            let offset = data.len();
            data.extend_from_slice(b"OggS");
            offset
        });
        assert_eq!(offset, 0);
        assert_eq!(blob.len(), 4);
        assert!(blob.is_changed());
    }
}
