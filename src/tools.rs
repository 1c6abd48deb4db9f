//! External media tools: `ffprobe`, `ffmpeg` and `FSB5.Converter`

use crate::error::{PatcherError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

pub const FFPROBE: &str = "ffprobe";
pub const FFMPEG: &str = "ffmpeg";
pub const FSB5_CONVERTER: &str = "FSB5.Converter";

/// One stream of `ffprobe -show_streams`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

/// Parse the JSON printed by `ffprobe -print_format json -show_streams`
pub fn parse_probe(json: &[u8]) -> Result<Vec<ProbeStream>> {
    Ok(serde_json::from_slice::<ProbeOutput>(json)?.streams)
}

/// Locates and runs the external tools
#[derive(Debug, Clone, Default)]
pub struct Tools {
    dir: Option<PathBuf>,
}

impl Tools {
    /// Tools are looked up in `dir` first, then on `PATH`
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    fn program(&self, name: &str) -> PathBuf {
        if let Some(dir) = &self.dir {
            for candidate in [dir.join(name), dir.join(format!("{}.exe", name))] {
                if candidate.is_file() {
                    return candidate;
                }
            }
        }
        PathBuf::from(name)
    }

    fn run(&self, tool: &str, command: &mut Command) -> Result<Output> {
        let output = command
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PatcherError::tool(tool, "not found"),
                _ => PatcherError::tool(tool, e.to_string()),
            })?;
        if !output.status.success() {
            return Err(PatcherError::tool(
                tool,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output)
    }

    /// Whether the tool can be started at all
    pub fn is_available(&self, tool: &str) -> bool {
        Command::new(self.program(tool))
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    pub fn probe(&self, file: &Path) -> Result<Vec<ProbeStream>> {
        let output = self.run(
            FFPROBE,
            Command::new(self.program(FFPROBE))
                .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
                .arg(file),
        )?;
        parse_probe(&output.stdout)
    }

    /// Re-encode `input` into `output`, overwriting it
    pub fn transcode(&self, input: &Path, output: &Path, vcodec: &str, acodec: &str, preset: &str) -> Result<()> {
        tracing::info!("Converting video: {}...", input.display());
        self.run(
            FFMPEG,
            Command::new(self.program(FFMPEG))
                .args(["-y", "-loglevel", "error", "-i"])
                .arg(input)
                .args(["-vcodec", vcodec, "-acodec", acodec, "-preset", preset])
                .arg(output),
        )?;
        Ok(())
    }

    /// Build an FSB5 bank from `input` at `output_file`
    pub fn convert_to_fsb5(
        &self,
        input: &Path,
        compression_format: &str,
        output_file: &Path,
        cache_folder: &Path,
        threads: usize,
    ) -> Result<()> {
        if !input.is_file() {
            return Err(PatcherError::tool(
                FSB5_CONVERTER,
                format!("File not found: {}", input.display()),
            ));
        }
        let out_dir = output_file.parent().unwrap_or_else(|| Path::new("."));
        let name = output_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.run(
            FSB5_CONVERTER,
            Command::new(self.program(FSB5_CONVERTER))
                .arg("-a")
                .arg(input)
                .args(["-f", compression_format, "-o"])
                .arg(out_dir)
                .args(["-n", &name, "-b", &threads.to_string(), "-c"])
                .arg(cache_folder),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe() {
        let json = br#"{"streams": [
            {"index": 0, "codec_name": "h264", "codec_type": "video", "width": 1280, "height": 720},
            {"index": 1, "codec_name": "aac", "codec_type": "audio"}
        ]}"#;
        let streams = parse_probe(json).unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].width, Some(1280));
        assert_eq!(streams[1].codec_name, "aac");
        assert_eq!(streams[1].height, None);
    }

    #[test]
    fn test_missing_tool() {
        let tools = Tools::new(None);
        let err = tools
            .run("nope", &mut Command::new("definitely-not-a-real-tool-4d1a"))
            .unwrap_err();
        assert_eq!(err.to_string(), "nope: not found");
    }

    #[test]
    fn test_fsb5_requires_input() {
        let tools = Tools::new(None);
        let err = tools
            .convert_to_fsb5(Path::new("missing.ogg"), "Vorbis", Path::new("_TEMP/a.fsb"), Path::new("_TEMP/c"), 1)
            .unwrap_err();
        assert!(matches!(err, PatcherError::Tool { .. }));
    }
}
