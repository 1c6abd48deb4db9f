//! One-time bootstrap shared by all workers
//!
//! The first caller of [`ensure_initialized`] creates the temp folder and
//! probes the external tools; everyone else gets the cached result.

use crate::error::Result;
use crate::settings::Settings;
use crate::tools::{FFMPEG, FFPROBE, FSB5_CONVERTER, Tools};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

static RUNTIME: Mutex<Option<Arc<Runtime>>> = Mutex::new(None);

#[derive(Debug)]
pub struct Runtime {
    temp_dir: PathBuf,
    pub ffmpeg: bool,
    pub ffprobe: bool,
    pub fsb5_converter: bool,
}

impl Runtime {
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

/// Initialize once; later calls return the same runtime
pub fn ensure_initialized(settings: &Settings) -> Result<Arc<Runtime>> {
    let mut slot = RUNTIME.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(runtime) = slot.as_ref() {
        return Ok(runtime.clone());
    }

    std::fs::create_dir_all(&settings.temp_path)?;
    let tools = Tools::new(settings.tools_dir.clone());
    let runtime = Arc::new(Runtime {
        temp_dir: settings.temp_path.clone(),
        ffmpeg: tools.is_available(FFMPEG),
        ffprobe: tools.is_available(FFPROBE),
        fsb5_converter: tools.is_available(FSB5_CONVERTER),
    });
    tracing::debug!("Runtime initialized: {:?}", runtime);

    *slot = Some(runtime.clone());
    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialized_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            temp_path: dir.path().join("_TEMP"),
            ..Default::default()
        };
        let first = ensure_initialized(&settings).unwrap();
        let second = ensure_initialized(&Settings::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
