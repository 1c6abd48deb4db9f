//! Per-object export and import dispatch with run statistics

use crate::classes::{DefaultManager, ManagerKind, ObjectManager, SDF_SCRIPT};
use crate::context::Context;
use crate::error::PatcherError;
use crate::patch_file::{PatchFile, PatchKind};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use unity_patcher_binary::ObjectHandle;

/// How objects are written by `unpack`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Type specific files (png, wav, json, ...)
    #[default]
    Normal,
    /// `.obj` object bytes and `.content` payloads
    Raw,
    /// `.dump.json` field trees
    Dump,
}

/// One entry of the end-of-run report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionData {
    pub name: String,
    pub type_name: String,
    pub path_id: i64,
    pub message: String,
}

impl fmt::Display for ExceptionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} #{}: {}", self.name, self.type_name, self.path_id, self.message)
    }
}

/// Counters and report entries shared by all workers
#[derive(Debug, Default)]
pub struct Statistics {
    success: AtomicUsize,
    failure: AtomicUsize,
    errors: Mutex<Vec<ExceptionData>>,
    exceptions: Mutex<Vec<ExceptionData>>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&self) -> usize {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> usize {
        self.failure.load(Ordering::Relaxed)
    }

    pub fn increment_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn errors(&self) -> Vec<ExceptionData> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn exceptions(&self) -> Vec<ExceptionData> {
        self.exceptions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn entry(manager: &dyn ObjectManager, message: String) -> ExceptionData {
        let base = manager.base();
        ExceptionData {
            name: base.name().to_string(),
            type_name: base.type_name().to_string(),
            path_id: base.path_id(),
            message,
        }
    }

    fn log(manager: &dyn ObjectManager, description: &str, error: &PatcherError) -> String {
        let message = format!("{}: {}", description, error);
        tracing::error!(
            "{}\n[ERR] {}",
            manager.base().describe(manager.script_name().as_deref()),
            message
        );
        message
    }

    /// Hard failure of an operation on one object
    pub fn log_error(&self, manager: &dyn ObjectManager, description: &str, error: &PatcherError) {
        let message = Self::log(manager, description, error);
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Self::entry(manager, message));
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    /// Degraded operation that still produced a result; not a failure
    pub fn log_exception(&self, manager: &dyn ObjectManager, description: &str, error: &PatcherError) {
        let message = Self::log(manager, description, error);
        self.exceptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Self::entry(manager, message));
    }

    /// Errors, then exceptions, then the counters
    pub fn print_summary(&self) {
        let errors = self.errors();
        let exceptions = self.exceptions();
        if !errors.is_empty() {
            tracing::error!("[ERR] Errors:");
            for entry in &errors {
                tracing::error!("{}", entry);
            }
        }
        if !exceptions.is_empty() {
            tracing::warn!("[WARN] Operation completed with the following exceptions:");
            for entry in &exceptions {
                tracing::warn!("{}", entry);
            }
        }
        if self.success() + self.failure() == 0 {
            tracing::warn!("[WARN] No assets have been processed. Check your settings and paths.");
        }
        tracing::info!("Success: {} | Failures: {}", self.success(), self.failure());
        if !errors.is_empty() || !exceptions.is_empty() {
            tracing::info!("See the detailed report above.");
        }
    }
}

/// Builds managers for objects and drives their export and import
pub struct ObjectHandler {
    ctx: Arc<Context>,
    stats: Arc<Statistics>,
}

impl ObjectHandler {
    pub fn new(ctx: Arc<Context>, stats: Arc<Statistics>) -> Self {
        Self { ctx, stats }
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.stats
    }

    /// Manager for the object's class; the default manager when the class
    /// specific one can't decode it
    pub fn manager_for(&self, object: &ObjectHandle) -> Box<dyn ObjectManager> {
        self.create(ManagerKind::for_class(object.class()), object)
    }

    fn create(&self, kind: ManagerKind, object: &ObjectHandle) -> Box<dyn ObjectManager> {
        match kind.create(object.clone(), self.ctx.clone()) {
            Ok(manager) => manager,
            Err(e) => {
                tracing::warn!("[WARN] Failed to parse object {}: {}", object.path_id(), e);
                Box::new(DefaultManager::new(object.clone(), self.ctx.clone()))
            }
        }
    }

    /// Export one object. With `export_sdf`, TextMeshPro font assets are
    /// exported with their material and atlases.
    pub fn export(&self, object: &ObjectHandle, mode: ExportMode, export_sdf: bool) {
        let mut manager = self.manager_for(object);
        if export_sdf && manager.script_name().as_deref() == Some(SDF_SCRIPT) {
            manager = self.create(ManagerKind::Sdf, object);
        }

        let result = match mode {
            ExportMode::Normal => match manager.export(None) {
                Ok(()) => Ok(""),
                Err(e) => {
                    self.stats.log_exception(manager.as_ref(), "Regular export failed", &e);
                    manager.export_dump(None).map(|()| " as dump")
                }
            },
            ExportMode::Dump => manager.export_dump(None).map(|()| " as dump"),
            ExportMode::Raw => manager.export_raw(None).map(|()| " as raw"),
        };

        match result {
            Ok(suffix) => {
                self.stats.increment_success();
                let script = manager
                    .script_name()
                    .map(|script| format!("@{} ", script))
                    .unwrap_or_default();
                tracing::info!(
                    "[INF] Successfully saved {}{}: {}{}",
                    manager.base().type_name(),
                    suffix,
                    script,
                    manager.name()
                );
            }
            Err(e) => self.stats.log_error(manager.as_ref(), "Export failed", &e),
        }
    }

    /// Apply the patches that target one object, in kind priority order
    pub fn import(&self, object: &ObjectHandle, patches: &[Arc<PatchFile>]) {
        let mut manager = self.manager_for(object);
        let mut patches = patches.to_vec();
        patches.sort_by_key(|patch| patch.kind.priority());

        let mut regular = Vec::new();
        for patch in patches {
            let result = match patch.kind {
                PatchKind::Raw => patch
                    .read_bytes()
                    .and_then(|data| manager.base_mut().set_raw_data(data))
                    .map_err(|e| ("Raw import failed", e)),
                PatchKind::RawContent => manager
                    .import_raw_content(&patch.path)
                    .map_err(|e| ("Raw content import failed", e)),
                PatchKind::Dump => manager
                    .import_dump(&patch.path)
                    .map_err(|e| ("Dump import failed", e)),
                PatchKind::Regular => {
                    regular.push(patch);
                    continue;
                }
            };
            self.record(manager.as_ref(), &[patch], result);
        }
        if regular.is_empty() {
            return;
        }

        match manager.kind() {
            ManagerKind::Default => {
                for patch in &regular {
                    let error = PatcherError::unsupported(format!("{} can't be imported", patch.file_name()));
                    self.stats
                        .log_error(manager.as_ref(), "No suitable manager for the regular file", &error);
                }
            }
            ManagerKind::Texture2DArray => {
                regular.sort_by_key(|patch| patch.index);
                let files: Vec<_> = regular.iter().map(|patch| patch.path.clone()).collect();
                let result = manager
                    .import_layers(&files)
                    .map_err(|e| ("Regular file import failed", e));
                self.record(manager.as_ref(), &regular, result);
            }
            _ => {
                for patch in regular {
                    let result = manager
                        .import(&patch.path)
                        .map_err(|e| ("Regular file import failed", e));
                    self.record(manager.as_ref(), &[patch], result);
                }
            }
        }
    }

    fn record(
        &self,
        manager: &dyn ObjectManager,
        patches: &[Arc<PatchFile>],
        result: std::result::Result<(), (&str, PatcherError)>,
    ) {
        match result {
            Ok(()) => {
                self.stats.increment_success();
                for patch in patches {
                    patch.mark_imported();
                    tracing::info!(
                        "[INF] Successfully patched {}: {}",
                        manager.base().type_name(),
                        patch.file_name()
                    );
                }
            }
            Err((description, e)) => self.stats.log_error(manager, description, &e),
        }
    }
}
