// SentioVox - Audio Output
// Encodes the final waveform as 16-bit mono WAV

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio_processor::AudioBuffer;
use crate::pipeline::SegmentAudio;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Output I/O error: {0}")]
    Io(String),
    #[error("WAV encoding error: {0}")]
    Wav(String),
}

impl From<hound::Error> for OutputError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => OutputError::Io(io.to_string()),
            other => OutputError::Wav(other.to_string()),
        }
    }
}

/// Destination for a finished synthesis run
pub trait AudioSink {
    fn write(&mut self, audio: &AudioBuffer) -> Result<(), OutputError>;
}

/// Writes the run to a WAV file
pub struct WavFileSink {
    path: PathBuf,
}

impl WavFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSink for WavFileSink {
    fn write(&mut self, audio: &AudioBuffer) -> Result<(), OutputError> {
        save_wav(audio, &self.path)
    }
}

/// Keeps the run in memory as WAV bytes
#[derive(Default)]
pub struct WavBytesSink {
    pub bytes: Vec<u8>,
}

impl AudioSink for WavBytesSink {
    fn write(&mut self, audio: &AudioBuffer) -> Result<(), OutputError> {
        self.bytes = encode_wav(audio)?;
        Ok(())
    }
}

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Encode to an in-memory 16-bit PCM WAV, clamping samples to [-1, 1]
pub fn encode_wav(audio: &AudioBuffer) -> Result<Vec<u8>, OutputError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, wav_spec(audio.sample_rate))?;
        for &sample in &audio.samples {
            writer.write_sample(to_pcm16(sample))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

pub fn save_wav(audio: &AudioBuffer, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| OutputError::Io(e.to_string()))?;
        }
    }
    let mut writer = WavWriter::create(path, wav_spec(audio.sample_rate))?;
    for &sample in &audio.samples {
        writer.write_sample(to_pcm16(sample))?;
    }
    writer.finalize()?;
    log::info!(
        "[Output] Wrote {:.2}s of audio to {}",
        audio.duration_secs(),
        path.display()
    );
    Ok(())
}

/// Write each segment to `dir` as `<name>.wav`, or `<index:04>.wav` when
/// unnamed. Empty segments are skipped. Returns the written paths.
pub fn save_segment_files(
    dir: &Path,
    segments: &[SegmentAudio],
) -> Result<Vec<PathBuf>, OutputError> {
    std::fs::create_dir_all(dir).map_err(|e| OutputError::Io(e.to_string()))?;

    let mut written = Vec::with_capacity(segments.len());
    for segment in segments {
        if segment.audio.is_empty() {
            log::debug!("[Output] Segment {} has no audio, not saved", segment.index);
            continue;
        }
        let stem = match &segment.name {
            Some(name) => name.replace(['/', '\\'], "_"),
            None => format!("{:04}", segment.index),
        };
        let path = dir.join(format!("{stem}.wav"));
        save_wav(&segment.audio, &path)?;
        written.push(path);
    }
    Ok(written)
}

/// `output_<YYYYmmdd_HHMMSS>.wav` in the working directory
pub fn default_output_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("output_{stamp}.wav"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_clamps_and_keeps_rate() {
        let audio = AudioBuffer::new(vec![0.0, 0.5, 2.0, -3.0], 24000);
        let bytes = encode_wav(&audio).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16384, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn file_sink_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("out.wav");
        let mut sink = WavFileSink::new(&path);
        sink.write(&AudioBuffer::new(vec![0.1; 240], 24000)).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 240);
    }

    #[test]
    fn bytes_sink_holds_a_readable_wav() {
        let mut sink = WavBytesSink::default();
        sink.write(&AudioBuffer::new(vec![0.25; 480], 48000)).unwrap();

        let reader = hound::WavReader::new(Cursor::new(sink.bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 48000);
        assert_eq!(reader.len(), 480);
    }

    #[test]
    fn segment_files_use_names_and_skip_empty_audio() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("lines");
        let segments = vec![
            SegmentAudio {
                index: 3,
                name: Some("0003_Aoi_喜び".to_string()),
                audio: AudioBuffer::new(vec![0.1; 240], 24000),
            },
            SegmentAudio {
                index: 4,
                name: None,
                audio: AudioBuffer::new(vec![0.1; 120], 24000),
            },
            SegmentAudio {
                index: 5,
                name: Some("0005_Ren_".to_string()),
                audio: AudioBuffer::empty(24000),
            },
        ];

        let written = save_segment_files(&out, &segments).unwrap();
        assert_eq!(
            written,
            vec![out.join("0003_Aoi_喜び.wav"), out.join("0004.wav")]
        );
        assert_eq!(hound::WavReader::open(&written[0]).unwrap().len(), 240);
        assert_eq!(hound::WavReader::open(&written[1]).unwrap().len(), 120);
        assert!(!out.join("0005_Ren_.wav").exists());
    }

    #[test]
    fn default_path_is_timestamped_wav() {
        let path = default_output_path();
        let name = path.to_string_lossy();
        assert!(name.starts_with("output_"));
        assert!(name.ends_with(".wav"));
        assert_eq!(name.len(), "output_20240101_120000.wav".len());
    }
}
