// Audio ingestion module
// Reads WAV recordings and replays them as fixed-length capture frames

use hound::{SampleFormat, WavReader};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

use crate::audio::capture::AcquisitionError;
use crate::audio::window::FrameSource;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid audio data")]
    InvalidData,
}

#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples normalized to f32 in range [-1.0, 1.0], interleaved
    pub samples: Vec<f32>,

    /// Sample rate in Hz (e.g., 16000, 44100)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bit depth of original audio (8, 16, 24, 32)
    pub bit_depth: u16,

    /// Duration in milliseconds
    pub duration_ms: i64,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks(self.channels as usize)
            .take(self.frame_count)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

/// Ingest a WAV file from raw bytes
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    decode(WavReader::new(Cursor::new(data))?)
}

/// Ingest a WAV file from disk
pub fn read_wav(path: &Path) -> Result<AudioData, AudioError> {
    decode(WavReader::open(path)?)
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<AudioData, AudioError> {
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;
    let bit_depth = spec.bits_per_sample;

    if channels == 0 || sample_rate == 0 {
        return Err(AudioError::InvalidData);
    }

    // hound yields signed integers for every PCM width, so only the scale differs
    let samples: Vec<f32> = match (spec.sample_format, bit_depth) {
        (SampleFormat::Int, 8 | 16 | 24 | 32) => {
            let scale = (1i64 << (bit_depth - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                format, bits
            )));
        }
    };

    let frame_count = samples.len() / channels as usize;
    let duration_ms = (frame_count as f64 / sample_rate as f64 * 1000.0) as i64;

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
        bit_depth,
        duration_ms,
        frame_count,
    })
}

/// Replays a decoded recording as consecutive capture frames
/// The final partial frame is zero padded; afterwards the source is exhausted
pub struct WavSource {
    mono: Vec<f32>,
    sample_rate: u32,
    position: usize,
}

impl WavSource {
    pub fn new(audio: &AudioData) -> Self {
        WavSource {
            mono: audio.to_mono(),
            sample_rate: audio.sample_rate,
            position: 0,
        }
    }

    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let audio = read_wav(path)?;
        log::info!(
            "Opened {}: {} Hz, {} channels, {} ms",
            path.display(),
            audio.sample_rate,
            audio.channels,
            audio.duration_ms
        );
        Ok(Self::new(&audio))
    }

    /// Frames remaining for a given frame length
    pub fn remaining_frames(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.mono.len().saturating_sub(self.position).div_ceil(len)
    }
}

impl FrameSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self, len: usize) -> Result<Option<Vec<f32>>, AcquisitionError> {
        if len == 0 || self.position >= self.mono.len() {
            return Ok(None);
        }

        let end = (self.position + len).min(self.mono.len());
        let mut frame = self.mono[self.position..end].to_vec();
        frame.resize(len, 0.0);
        self.position = end;

        Ok(Some(frame))
    }
}
