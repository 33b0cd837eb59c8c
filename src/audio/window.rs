// Capture windows
// Fixed-length mono sample buffers handed from the capture loop to classifiers

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::audio::capture::AcquisitionError;

/// One fixed-length window of mono audio, normalized to [-1.0, 1.0]
///
/// Samples are shared behind an `Arc` so a window can move into a
/// classification task without copying the buffer.
#[derive(Debug, Clone)]
pub struct AudioWindow {
    /// Capture order within a listening session, starting at 0
    pub sequence: u64,

    /// Sample rate in Hz declared by the source
    pub sample_rate: u32,

    /// Mono samples
    pub samples: Arc<[f32]>,

    /// Wall-clock time the window was read from the source
    pub captured_at: DateTime<Utc>,
}

impl AudioWindow {
    pub fn new(sequence: u64, sample_rate: u32, samples: Vec<f32>) -> Self {
        AudioWindow {
            sequence,
            sample_rate,
            samples: samples.into(),
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Activity level of the window in [0.0, 1.0]
    pub fn level(&self) -> f32 {
        activity_level(&self.samples)
    }

    /// Window length in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }

    /// SHA-256 over the little-endian sample bytes, hex encoded.
    /// Identical windows always share a digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sample_rate.to_le_bytes());
        for sample in self.samples.iter() {
            hasher.update(sample.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// RMS-based activity level, normalized to [0.0, 1.0]
/// An RMS of 0.5 or more is treated as full scale
pub fn activity_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_squares / samples.len() as f32).sqrt();

    (rms * 2.0).min(1.0)
}

/// A capability that yields fixed-length mono frames at a declared sample rate
///
/// `Ok(None)` means the source is exhausted (end of a file); live sources
/// never return it. An `Err` is fatal to the listening session.
pub trait FrameSource: Send {
    /// Declared sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Read the next frame of exactly `len` samples
    fn read_frame(&mut self, len: usize) -> Result<Option<Vec<f32>>, AcquisitionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_level_silence() {
        assert_eq!(activity_level(&[]), 0.0);
        assert_eq!(activity_level(&[0.0; 256]), 0.0);
    }

    #[test]
    fn test_activity_level_saturates() {
        let loud = vec![0.9; 256];
        assert_eq!(activity_level(&loud), 1.0);

        let quiet = vec![0.1; 256];
        assert!((activity_level(&quiet) - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_window_duration() {
        let window = AudioWindow::new(0, 16000, vec![0.0; 2048]);
        assert_eq!(window.duration_ms(), 128);
        assert_eq!(window.len(), 2048);
    }

    #[test]
    fn test_digest_is_stable() {
        let a = AudioWindow::new(0, 16000, vec![0.25, -0.5, 0.75]);
        let b = AudioWindow::new(7, 16000, vec![0.25, -0.5, 0.75]);
        let c = AudioWindow::new(0, 16000, vec![0.25, -0.5, 0.70]);

        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
