// Spectral feature extraction
// Reduces a capture window to the small feature vector the local classifier scores

use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Spectral and temporal features of one capture window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundFeatures {
    /// Spectral centroid (Hz) - "center of mass" of spectrum
    /// Alarms and breaking glass sit high, horns and hums sit low
    pub spectral_centroid: f32,

    /// Zero-crossing rate (crossings per sample)
    /// Higher values indicate noisy or high-pitched content
    pub zcr: f32,

    /// Energy in low frequency band (0-200 Hz)
    /// Normalized to [0, 1] relative to total energy
    pub low_band_energy: f32,

    /// Energy in mid frequency band (200-2000 Hz)
    /// Normalized to [0, 1] relative to total energy
    pub mid_band_energy: f32,

    /// Energy in high frequency band (2000+ Hz)
    /// Normalized to [0, 1] relative to total energy
    pub high_band_energy: f32,

    /// Root-mean-square amplitude of the raw window
    pub rms: f32,
}

impl SoundFeatures {
    /// Features of an empty or silent window
    pub fn zero() -> Self {
        SoundFeatures {
            spectral_centroid: 0.0,
            zcr: 0.0,
            low_band_energy: 0.0,
            mid_band_energy: 0.0,
            high_band_energy: 0.0,
            rms: 0.0,
        }
    }

    /// Build a reference profile (RMS is not part of matching)
    pub fn profile(spectral_centroid: f32, zcr: f32, low: f32, mid: f32, high: f32) -> Self {
        SoundFeatures {
            spectral_centroid,
            zcr,
            low_band_energy: low,
            mid_band_energy: mid,
            high_band_energy: high,
            rms: 0.0,
        }
    }

    /// Euclidean distance to another feature vector, ignoring loudness
    pub fn distance_to(&self, other: &SoundFeatures) -> f32 {
        let d_centroid = (self.spectral_centroid - other.spectral_centroid) / 5000.0; // Normalize to ~[0,1]
        let d_zcr = self.zcr - other.zcr;
        let d_low = self.low_band_energy - other.low_band_energy;
        let d_mid = self.mid_band_energy - other.mid_band_energy;
        let d_high = self.high_band_energy - other.high_band_energy;

        (d_centroid * d_centroid
            + d_zcr * d_zcr
            + d_low * d_low
            + d_mid * d_mid
            + d_high * d_high)
            .sqrt()
    }
}

/// Extract spectral features from a mono window
pub fn extract_features(samples: &[f32], sample_rate: u32) -> SoundFeatures {
    if samples.is_empty() || sample_rate == 0 {
        return SoundFeatures::zero();
    }

    let zcr = calculate_zcr(samples);
    let rms = calculate_rms(samples);

    let window_size = samples.len().min(4096);
    let (centroid, band_energies) = calculate_spectral_features(samples, sample_rate, window_size);

    SoundFeatures {
        spectral_centroid: centroid,
        zcr,
        low_band_energy: band_energies[0],
        mid_band_energy: band_energies[1],
        high_band_energy: band_energies[2],
        rms,
    }
}

/// Calculate Zero-Crossing Rate (ZCR)
fn calculate_zcr(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }

    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();

    crossings as f32 / (samples.len() - 1) as f32
}

fn calculate_rms(samples: &[f32]) -> f32 {
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Calculate spectral centroid and band energies
/// Returns (centroid in Hz, [low, mid, high] energy ratios)
fn calculate_spectral_features(
    samples: &[f32],
    sample_rate: u32,
    window_size: usize,
) -> (f32, [f32; 3]) {
    // Pad or truncate to window size
    let mut windowed = vec![0.0; window_size];
    let copy_len = samples.len().min(window_size);
    windowed[..copy_len].copy_from_slice(&samples[..copy_len]);

    apply_hann_window(&mut windowed);

    let spectrum = compute_fft(&windowed);
    if spectrum.is_empty() {
        return (0.0, [0.0, 0.0, 0.0]);
    }

    let centroid = calculate_spectral_centroid(&spectrum, sample_rate, window_size);
    let band_energies = calculate_band_energies(&spectrum, sample_rate, window_size);

    (centroid, band_energies)
}

/// Apply Hann window function to reduce spectral leakage
fn apply_hann_window(samples: &mut [f32]) {
    let n = samples.len();
    if n == 0 {
        return;
    }

    for (i, sample) in samples.iter_mut().enumerate() {
        let window_val = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos());
        *sample *= window_val;
    }
}

/// Compute real FFT and return magnitude spectrum
/// An empty spectrum means the transform could not run
fn compute_fft(samples: &[f32]) -> Vec<f32> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(samples.len());

    let mut input = samples.to_vec();
    let mut spectrum = fft.make_output_vec();

    if let Err(err) = fft.process(&mut input, &mut spectrum) {
        log::warn!("FFT failed on {}-sample window: {}", samples.len(), err);
        return Vec::new();
    }

    spectrum.iter().map(|c| c.norm()).collect()
}

/// Spectral centroid in Hz
fn calculate_spectral_centroid(spectrum: &[f32], sample_rate: u32, window_size: usize) -> f32 {
    if window_size == 0 {
        return 0.0;
    }

    let bin_width = sample_rate as f32 / window_size as f32;

    let mut weighted_sum = 0.0;
    let mut total_magnitude = 0.0;
    for (i, &magnitude) in spectrum.iter().enumerate() {
        weighted_sum += i as f32 * bin_width * magnitude;
        total_magnitude += magnitude;
    }

    if total_magnitude > 0.0 {
        weighted_sum / total_magnitude
    } else {
        0.0
    }
}

/// Energy in frequency bands: low (0-200 Hz), mid (200-2000 Hz), high (2000+ Hz)
/// Returns normalized energy ratios [low, mid, high]
fn calculate_band_energies(spectrum: &[f32], sample_rate: u32, window_size: usize) -> [f32; 3] {
    if window_size == 0 {
        return [0.0, 0.0, 0.0];
    }

    let bin_width = sample_rate as f32 / window_size as f32;
    let low_max_bin = (200.0 / bin_width) as usize;
    let mid_max_bin = (2000.0 / bin_width) as usize;

    let mut bands = [0.0f32; 3];
    for (i, &magnitude) in spectrum.iter().enumerate() {
        let energy = magnitude * magnitude;
        let band = if i < low_max_bin {
            0
        } else if i < mid_max_bin {
            1
        } else {
            2
        };
        bands[band] += energy;
    }

    let total_energy: f32 = bands.iter().sum();
    if total_energy > 0.0 {
        [
            bands[0] / total_energy,
            bands[1] / total_energy,
            bands[2] / total_energy,
        ]
    } else {
        [0.0, 0.0, 0.0]
    }
}

#[cfg(test)]
pub(crate) fn sine_wave(frequency_hz: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            amplitude
                * (2.0 * std::f32::consts::PI * frequency_hz * i as f32 / sample_rate as f32).sin()
        })
        .collect()
}
