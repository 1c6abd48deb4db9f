use super::{BaseManager, ManagerKind, ObjectManager, int_field, save_file, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use crate::resource_packer;
use crate::runtime;
use std::path::Path;
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;
use unity_patcher_binary::audio::{AudioCompressionFormat, AudioKind, export_samples, is_importable};

/// Audio payload export and import, FSB5 conversion on import
pub struct AudioClipManager {
    base: BaseManager,
}

impl AudioClipManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }

    /// Run the FSB5 converter on `file`; returns the bank bytes
    fn convert(&mut self, file: &Path, format: AudioCompressionFormat) -> Result<Vec<u8>> {
        let runtime = runtime::ensure_initialized(self.base.settings())?;
        let output = runtime.temp_dir().join(format!("{}.fsb", self.base.name()));
        let cache = runtime.temp_dir().join("fsb5_cache");
        std::fs::create_dir_all(&cache)?;
        self.base.ctx.tools.convert_to_fsb5(
            file,
            format.converter_codec(),
            &output,
            &cache,
            num_cpus::get(),
        )?;
        Ok(std::fs::read(&output)?)
    }
}

impl ObjectManager for AudioClipManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::AudioClip
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        let Some(payload) = resource_packer::read_payload(&mut self.base)? else {
            return Err(PatcherError::export(format!("{} has no audio data", self.base.name())));
        };
        for (file_name, data) in export_samples(self.base.name(), &payload)? {
            let (stem, extension) = match file_name.rfind('.') {
                Some(dot) => file_name.split_at(dot),
                None => (file_name.as_str(), ""),
            };
            let dest = self.base.destination(stem, extension, dir);
            save_file(&dest, &data)?;
        }
        Ok(())
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        let data = std::fs::read(file)?;
        if !is_importable(&data) {
            return Err(PatcherError::import(format!(
                "Incorrect audio format: {}. Expected ogg/wav/mp3/fsb5",
                file.display()
            )));
        }

        let mut tree = self.base.tree()?.clone();
        let payload = if self.base.settings().dont_compress_audio || AudioKind::detect(&data) == AudioKind::Fsb5 {
            data
        } else {
            let format = AudioCompressionFormat::from(int_field(&tree, "m_CompressionFormat") as i32);
            let bank = self.convert(file, format)?;
            if format.converter_codec() == "Vorbis" && tree.contains_key("m_CompressionFormat") {
                tree.insert("m_CompressionFormat", AudioCompressionFormat::Vorbis.id());
            }
            bank
        };
        resource_packer::pack(&mut self.base, tree, payload)
    }

    fn raw_content(&mut self) -> Result<Option<Vec<u8>>> {
        resource_packer::read_payload(&mut self.base)
    }

    fn import_raw_content(&mut self, file: &Path) -> Result<()> {
        let payload = std::fs::read(file)?;
        let tree = self.base.tree()?.clone();
        resource_packer::pack(&mut self.base, tree, payload)
    }
}
