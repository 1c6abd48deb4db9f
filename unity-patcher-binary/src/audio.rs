//! Audio payload inspection and export
//!
//! AudioClip payloads are usually FMOD sound banks (`FSB5`). Banks holding
//! PCM samples are unpacked to WAV; anything else is exported as stored.

use crate::error::{BinaryError, Result};
use crate::reader::{BinaryReader, ByteOrder};
use std::io::Cursor;

/// Unity `AudioCompressionFormat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioCompressionFormat {
    #[default]
    PCM,
    Vorbis,
    ADPCM,
    MP3,
    VAG,
    HEVAG,
    XMA,
    AAC,
    GCADPCM,
    ATRAC9,
    Unknown(i32),
}

impl From<i32> for AudioCompressionFormat {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::PCM,
            1 => Self::Vorbis,
            2 => Self::ADPCM,
            3 => Self::MP3,
            4 => Self::VAG,
            5 => Self::HEVAG,
            6 => Self::XMA,
            7 => Self::AAC,
            8 => Self::GCADPCM,
            9 => Self::ATRAC9,
            other => Self::Unknown(other),
        }
    }
}

impl AudioCompressionFormat {
    pub fn id(self) -> i32 {
        match self {
            Self::PCM => 0,
            Self::Vorbis => 1,
            Self::ADPCM => 2,
            Self::MP3 => 3,
            Self::VAG => 4,
            Self::HEVAG => 5,
            Self::XMA => 6,
            Self::AAC => 7,
            Self::GCADPCM => 8,
            Self::ATRAC9 => 9,
            Self::Unknown(id) => id,
        }
    }

    /// Codec name understood by the FSB5 converter; Vorbis when it has none
    pub fn converter_codec(self) -> &'static str {
        match self {
            Self::PCM => "PCM",
            Self::XMA => "XMA",
            _ => "Vorbis",
        }
    }
}

/// Container detected from leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Ogg,
    Wav,
    Mp3,
    Fsb5,
    Unknown,
}

impl AudioKind {
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(b"OggS") {
            AudioKind::Ogg
        } else if data.starts_with(b"RIFF") {
            AudioKind::Wav
        } else if data.starts_with(b"ID3") || data.starts_with(&[0xFF, 0xFB]) {
            AudioKind::Mp3
        } else if data.starts_with(b"FSB5") {
            AudioKind::Fsb5
        } else {
            AudioKind::Unknown
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioKind::Ogg => ".ogg",
            AudioKind::Wav => ".wav",
            AudioKind::Mp3 => ".mp3",
            AudioKind::Fsb5 => ".fsb",
            AudioKind::Unknown => ".bin",
        }
    }
}

/// Whether `data` starts with a magic accepted for import (Ogg, RIFF, FSB5, ID3)
pub fn is_importable(data: &[u8]) -> bool {
    [&b"OggS"[..], b"RIFF", b"FSB5", b"ID3"]
        .iter()
        .any(|magic| data.starts_with(magic))
}

const FMOD_PCM8: u32 = 1;
const FMOD_PCM16: u32 = 2;

const FREQUENCIES: [u32; 10] = [0, 8000, 11000, 11025, 16000, 22050, 24000, 32000, 44100, 48000];

/// One sample of an FSB5 bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsbSample {
    pub name: Option<String>,
    pub frequency: u32,
    pub channels: u16,
    pub samples: u32,
    pub data: Vec<u8>,
}

/// Parsed FSB5 sound bank
#[derive(Debug, Clone)]
pub struct Fsb5 {
    pub version: u32,
    /// FMOD sound format of every sample
    pub mode: u32,
    pub samples: Vec<FsbSample>,
}

impl Fsb5 {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data, ByteOrder::Little);
        let magic = reader.take(4)?;
        if magic != b"FSB5" {
            return Err(BinaryError::invalid_signature(
                "FSB5".to_string(),
                String::from_utf8_lossy(magic).into_owned(),
            ));
        }
        let version = reader.read_u32()?;
        let count = reader.read_u32()?;
        let headers_size = reader.read_u32()? as usize;
        let names_size = reader.read_u32()? as usize;
        let data_size = reader.read_u32()? as usize;
        let mode = reader.read_u32()?;
        if version == 0 {
            reader.read_u32()?;
        }
        reader.take(32)?; // zero, hash, dummy
        let header_size = reader.position();

        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw = reader.read_u64()?;
            let mut has_chunk = raw & 1 == 1;
            let mut frequency = FREQUENCIES
                .get(((raw >> 1) & 0xF) as usize)
                .copied()
                .unwrap_or(0);
            let mut channels = ((raw >> 5) & 1) as u16 + 1;
            let offset = ((raw >> 6) & 0xFFF_FFFF) as usize * 16;
            let samples = ((raw >> 34) & 0x3FFF_FFFF) as u32;

            while has_chunk {
                let chunk = reader.read_u32()?;
                has_chunk = chunk & 1 == 1;
                let size = ((chunk >> 1) & 0xFF_FFFF) as usize;
                let kind = (chunk >> 25) & 0x7F;
                let body = reader.take(size)?;
                match kind {
                    1 if !body.is_empty() => channels = body[0] as u16,
                    2 if body.len() >= 4 => {
                        frequency = u32::from_le_bytes([body[0], body[1], body[2], body[3]])
                    }
                    _ => {}
                }
            }
            headers.push((offset, frequency, channels, samples));
        }

        let names = if names_size > 0 {
            let table_start = header_size + headers_size;
            let mut names = Vec::with_capacity(count as usize);
            reader.set_position(table_start)?;
            let offsets = (0..count)
                .map(|_| reader.read_u32())
                .collect::<Result<Vec<_>>>()?;
            for offset in offsets {
                reader.set_position(table_start + offset as usize)?;
                names.push(Some(reader.read_cstring()?));
            }
            names
        } else {
            vec![None; count as usize]
        };

        let data_start = header_size + headers_size + names_size;
        let mut samples = Vec::with_capacity(headers.len());
        for (i, (offset, frequency, channels, count)) in headers.iter().enumerate() {
            let end = headers.get(i + 1).map(|next| next.0).unwrap_or(data_size);
            let start = data_start + offset;
            let stop = data_start + end;
            let bytes = data
                .get(start..stop)
                .ok_or_else(|| BinaryError::not_enough_data(stop, data.len()))?;
            samples.push(FsbSample {
                name: names[i].clone(),
                frequency: *frequency,
                channels: *channels,
                samples: *count,
                data: bytes.to_vec(),
            });
        }

        Ok(Self {
            version,
            mode,
            samples,
        })
    }

    pub fn is_pcm(&self) -> bool {
        matches!(self.mode, FMOD_PCM8 | FMOD_PCM16)
    }
}

/// Wrap interleaved PCM samples in a WAV container
pub fn pcm_to_wav(sample: &FsbSample, bits: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: sample.channels.max(1),
        sample_rate: sample.frequency,
        bits_per_sample: bits,
        sample_format: hound::SampleFormat::Int,
    };
    let mut output = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut output), spec)?;
        if bits == 8 {
            for &byte in &sample.data {
                writer.write_sample(byte as i8)?;
            }
        } else {
            for pair in sample.data.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
            }
        }
        writer.finalize()?;
    }
    Ok(output)
}

/// Files to write for a clip payload: `(file name, bytes)`.
///
/// PCM banks become one WAV per sample (`name.wav`, `name-1.wav`, ...);
/// everything else is a single file with an extension from its magic.
pub fn export_samples(name: &str, data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let kind = AudioKind::detect(data);
    if kind == AudioKind::Fsb5 {
        match Fsb5::parse(data) {
            Ok(bank) if bank.is_pcm() => {
                let bits = if bank.mode == FMOD_PCM8 { 8 } else { 16 };
                return bank
                    .samples
                    .iter()
                    .enumerate()
                    .map(|(i, sample)| {
                        let file = if i > 0 {
                            format!("{}-{}.wav", name, i)
                        } else {
                            format!("{}.wav", name)
                        };
                        Ok((file, pcm_to_wav(sample, bits)?))
                    })
                    .collect();
            }
            Ok(bank) => {
                tracing::debug!("FSB5 mode {} kept as a sound bank", bank.mode);
            }
            Err(e) => tracing::warn!("Malformed FSB5 payload for {}: {}", name, e),
        }
    }
    Ok(vec![(format!("{}{}", name, kind.extension()), data.to_vec())])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single-sample PCM16 bank, 44100 Hz mono, no names
    fn pcm_bank(pcm: &[i16]) -> Vec<u8> {
        let payload: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut out = b"FSB5".to_vec();
        for value in [1u32, 1, 8, 0, payload.len() as u32, FMOD_PCM16] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 32]);
        let raw: u64 = (8 << 1) | ((pcm.len() as u64) << 34);
        out.extend_from_slice(&raw.to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn test_detect_and_importable() {
        assert_eq!(AudioKind::detect(b"OggS\0\0"), AudioKind::Ogg);
        assert_eq!(AudioKind::detect(b"ID3\x04"), AudioKind::Mp3);
        assert!(is_importable(b"RIFF....WAVE"));
        assert!(!is_importable(b"fLaC"));
    }

    #[test]
    fn test_parse_pcm_bank() {
        let bank = Fsb5::parse(&pcm_bank(&[1, -1, 300])).unwrap();
        assert!(bank.is_pcm());
        assert_eq!(bank.samples.len(), 1);
        let sample = &bank.samples[0];
        assert_eq!(sample.frequency, 44100);
        assert_eq!(sample.channels, 1);
        assert_eq!(sample.samples, 3);
        assert_eq!(sample.data.len(), 6);
    }

    #[test]
    fn test_export_pcm_as_wav() {
        let files = export_samples("Jump", &pcm_bank(&[0, 100, -100, 0])).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "Jump.wav");
        assert!(files[0].1.starts_with(b"RIFF"));

        let reader = hound::WavReader::new(Cursor::new(&files[0].1)).unwrap();
        assert_eq!(reader.spec().sample_rate, 44100);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn test_export_other_payload_verbatim() {
        let files = export_samples("Theme", b"OggS-data").unwrap();
        assert_eq!(files, vec![("Theme.ogg".to_string(), b"OggS-data".to_vec())]);
    }

    #[test]
    fn test_converter_codec() {
        assert_eq!(AudioCompressionFormat::from(1).converter_codec(), "Vorbis");
        assert_eq!(AudioCompressionFormat::from(0).converter_codec(), "PCM");
        assert_eq!(AudioCompressionFormat::from(9).converter_codec(), "Vorbis");
    }
}
