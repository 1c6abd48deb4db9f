use super::{BaseManager, ManagerKind, ObjectManager, int_field, save_file, str_field};
use crate::context::Context;
use crate::error::{PatcherError, Result};
use crate::resource_packer;
use crate::runtime;
use crate::tools::ProbeStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unity_patcher_binary::ObjectHandle;

/// Encoder settings for a container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transcoding {
    pub video_encoder: &'static str,
    pub audio_encoder: &'static str,
    pub extension: &'static str,
    /// Codec names `ffprobe` reports for a file that needs no re-encode
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
}

/// Keyed by the clip's `m_Format`
const TRANSCODING: &[(i64, Transcoding)] = &[
    (
        1,
        Transcoding {
            video_encoder: "libx264",
            audio_encoder: "aac",
            extension: ".mp4",
            video_codec: "h264",
            audio_codec: "aac",
        },
    ),
    (
        2,
        Transcoding {
            video_encoder: "wmv2",
            audio_encoder: "wmav2",
            extension: ".asf",
            video_codec: "wmv2",
            audio_codec: "wmav2",
        },
    ),
    (
        3,
        Transcoding {
            video_encoder: "libvpx-vp9",
            audio_encoder: "libvorbis",
            extension: ".webm",
            video_codec: "vp9",
            audio_codec: "vorbis",
        },
    ),
    (
        4,
        Transcoding {
            video_encoder: "libvpx",
            audio_encoder: "libvorbis",
            extension: ".webm",
            video_codec: "vp8",
            audio_codec: "vorbis",
        },
    ),
];

pub fn transcoding_for(format: i64) -> Option<Transcoding> {
    TRANSCODING
        .iter()
        .find(|(id, _)| *id == format)
        .map(|(_, transcoding)| *transcoding)
}

impl Transcoding {
    /// Whether the probed streams already use this format's codecs
    pub fn matches(&self, streams: &[ProbeStream]) -> bool {
        let codec_of = |kind: &str| {
            streams
                .iter()
                .find(|stream| stream.codec_type == kind)
                .map(|stream| stream.codec_name.as_str())
        };
        codec_of("video") == Some(self.video_codec)
            && codec_of("audio").is_none_or(|codec| codec == self.audio_codec)
    }
}

/// Video payload export and import through the resource packer
pub struct VideoClipManager {
    base: BaseManager,
}

impl VideoClipManager {
    pub fn new(object: ObjectHandle, ctx: Arc<Context>) -> Result<Self> {
        let mut base = BaseManager::new(object, ctx);
        let name = str_field(base.tree()?, "m_Name").map(str::to_string);
        base.set_name(name.as_deref());
        Ok(Self { base })
    }

    fn video_stream(streams: &[ProbeStream], file: &Path) -> Result<ProbeStream> {
        streams
            .iter()
            .find(|stream| stream.codec_type == "video")
            .cloned()
            .ok_or_else(|| PatcherError::import(format!("No video stream found: {}", file.display())))
    }

    /// Re-encode into the clip's container when its codecs differ
    fn transcode(&mut self, file: &Path, streams: &[ProbeStream], format: i64) -> Result<Option<PathBuf>> {
        let Some(transcoding) = transcoding_for(format) else {
            tracing::warn!("[WARN] No transcoding settings for video format {}", format);
            return Ok(None);
        };
        if transcoding.matches(streams) {
            return Ok(None);
        }
        let runtime = runtime::ensure_initialized(self.base.settings())?;
        let output = runtime
            .temp_dir()
            .join(format!("{}{}", self.base.name(), transcoding.extension));
        self.base.ctx.tools.transcode(
            file,
            &output,
            transcoding.video_encoder,
            transcoding.audio_encoder,
            &self.base.settings().transcode_quality,
        )?;
        Ok(Some(output))
    }
}

impl ObjectManager for VideoClipManager {
    fn base(&self) -> &BaseManager {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseManager {
        &mut self.base
    }

    fn kind(&self) -> ManagerKind {
        ManagerKind::VideoClip
    }

    fn export(&mut self, dir: Option<&Path>) -> Result<()> {
        let Some(payload) = resource_packer::read_payload(&mut self.base)? else {
            return Err(PatcherError::export(format!("{} has no video data", self.base.name())));
        };
        let dest = self.base.destination(self.base.name(), ".mp4", dir);
        save_file(&dest, &payload)
    }

    fn import(&mut self, file: &Path) -> Result<()> {
        let tools = self.base.ctx.tools.clone();
        let mut streams = tools.probe(file)?;
        Self::video_stream(&streams, file)?;

        let mut tree = self.base.tree()?.clone();
        let mut source = file.to_path_buf();
        if self.base.settings().transcode_video {
            let format = int_field(&tree, "m_Format");
            if let Some(output) = self.transcode(file, &streams, format)? {
                streams = tools.probe(&output)?;
                source = output;
            }
        }

        let video = Self::video_stream(&streams, &source)?;
        let width = video.width.unwrap_or_default();
        let height = video.height.unwrap_or_default();
        if (int_field(&tree, "Width"), int_field(&tree, "Height")) != (width as i64, height as i64) {
            tracing::warn!("[WARN] New video's dimensions differ from the original");
        }
        tree.insert("Width", width);
        tree.insert("Height", height);
        if tree.contains_key("m_ProxyWidth") {
            tree.insert("m_ProxyWidth", width);
            tree.insert("m_ProxyHeight", height);
        }

        let payload = std::fs::read(&source)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(kind: &str, codec: &str) -> ProbeStream {
        ProbeStream {
            codec_type: kind.to_string(),
            codec_name: codec.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_transcoding_lookup() {
        assert_eq!(transcoding_for(1).map(|t| t.extension), Some(".mp4"));
        assert_eq!(transcoding_for(3).map(|t| t.video_encoder), Some("libvpx-vp9"));
        assert!(transcoding_for(0).is_none());
    }

    #[test]
    fn test_matching_codecs_skip_transcode() {
        let mp4 = transcoding_for(1).unwrap();
        assert!(mp4.matches(&[stream("video", "h264"), stream("audio", "aac")]));
        assert!(mp4.matches(&[stream("video", "h264")]));
        assert!(!mp4.matches(&[stream("video", "vp9"), stream("audio", "aac")]));
        assert!(!mp4.matches(&[stream("video", "h264"), stream("audio", "mp3")]));
    }
}
