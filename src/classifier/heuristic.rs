// Local (on-device) sound classifier
// Nearest-prototype matching over spectral features; no model files, no randomness

use async_trait::async_trait;

use crate::audio::features::{extract_features, SoundFeatures};
use crate::audio::AudioWindow;
use crate::classifier::backend::{ClassifierBackend, ClassifierError, SoundClassifier};
use crate::classifier::types::{Classification, ClassificationSource, SoundLabel};

/// Windows quieter than this RMS carry no usable spectrum
const SILENCE_RMS: f32 = 1e-4;

/// Reference feature profile for one label
#[derive(Debug, Clone)]
pub struct SoundPrototype {
    pub label: SoundLabel,
    pub features: SoundFeatures,
}

/// Classifies a window as the label whose prototype is nearest in feature space
///
/// Confidence is `exp(-sharpness * distance)`. Equal distances resolve to the
/// prototype listed first, so results are fully reproducible.
pub struct LocalClassifier {
    prototypes: Vec<SoundPrototype>,
    sharpness: f32,
}

impl LocalClassifier {
    /// Classifier with the built-in household prototypes
    pub fn new() -> Self {
        Self::with_prototypes(default_prototypes())
    }

    pub fn with_prototypes(prototypes: Vec<SoundPrototype>) -> Self {
        LocalClassifier {
            prototypes,
            sharpness: 2.0,
        }
    }

    pub fn prototypes(&self) -> &[SoundPrototype] {
        &self.prototypes
    }

    /// Classify already-extracted features
    pub fn classify_features(&self, features: &SoundFeatures) -> Result<Classification, ClassifierError> {
        let mut best: Option<(&SoundPrototype, f32)> = None;
        for prototype in &self.prototypes {
            let distance = features.distance_to(&prototype.features);
            // Strictly less: ties keep the earlier prototype
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((prototype, distance));
            }
        }

        let (prototype, distance) = best.ok_or_else(|| {
            ClassifierError::Unavailable("local classifier has no prototypes".to_string())
        })?;

        let confidence = (-self.sharpness * distance).exp();
        Ok(Classification::new(
            prototype.label.clone(),
            confidence,
            ClassificationSource::Local,
        ))
    }

    /// Synchronous classification of a window
    pub fn classify_window(&self, window: &AudioWindow) -> Result<Classification, ClassifierError> {
        if window.is_empty() {
            return Err(ClassifierError::InvalidWindow("empty window".to_string()));
        }

        self.classify_extracted(&extract_features(&window.samples, window.sample_rate))
    }

    fn classify_extracted(&self, features: &SoundFeatures) -> Result<Classification, ClassifierError> {
        if features.rms < SILENCE_RMS {
            return Err(ClassifierError::InvalidWindow("silent window".to_string()));
        }
        self.classify_features(features)
    }
}

impl Default for LocalClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SoundClassifier for LocalClassifier {
    fn backend(&self) -> ClassifierBackend {
        ClassifierBackend::Local
    }

    async fn classify(&self, window: &AudioWindow) -> Result<Classification, ClassifierError> {
        if window.is_empty() {
            return Err(ClassifierError::InvalidWindow("empty window".to_string()));
        }

        // The FFT runs on the blocking pool; samples are shared, not copied
        let window = window.clone();
        let features = tokio::task::spawn_blocking(move || extract_features(&window.samples, window.sample_rate))
            .await
            .map_err(|e| ClassifierError::Unavailable(format!("feature extraction failed: {}", e)))?;
        self.classify_extracted(&features)
    }
}

/// Built-in profiles, in tie-break order
///
/// Alarms are narrow tones near 3 kHz, horns and cries sit in the mid band,
/// breaking glass is broadband and bright.
pub fn default_prototypes() -> Vec<SoundPrototype> {
    vec![
        prototype(SoundLabel::FireAlarm, 3100.0, 0.39, 0.00, 0.03, 0.97),
        prototype(SoundLabel::SmokeDetector, 3400.0, 0.42, 0.00, 0.02, 0.98),
        prototype(SoundLabel::Doorbell, 1100.0, 0.14, 0.05, 0.80, 0.15),
        prototype(SoundLabel::PhoneRing, 1600.0, 0.20, 0.02, 0.55, 0.43),
        prototype(SoundLabel::BabyCry, 900.0, 0.11, 0.05, 0.75, 0.20),
        prototype(SoundLabel::CarHorn, 450.0, 0.055, 0.12, 0.83, 0.05),
        prototype(SoundLabel::GlassBreak, 4800.0, 0.55, 0.02, 0.13, 0.85),
        prototype(SoundLabel::Scream, 2200.0, 0.27, 0.02, 0.40, 0.58),
    ]
}

fn prototype(label: SoundLabel, centroid: f32, zcr: f32, low: f32, mid: f32, high: f32) -> SoundPrototype {
    SoundPrototype {
        label,
        features: SoundFeatures::profile(centroid, zcr, low, mid, high),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::sine_wave;

    #[test]
    fn test_every_known_label_has_a_prototype() {
        let classifier = LocalClassifier::new();
        for label in SoundLabel::ALL {
            assert!(classifier.prototypes().iter().any(|p| p.label == label));
        }
    }

    #[test]
    fn test_alarm_tone_is_fire_alarm() {
        let classifier = LocalClassifier::new();
        let window = AudioWindow::new(0, 16000, sine_wave(3100.0, 16000, 2048, 0.5));

        let result = classifier.classify_window(&window).unwrap();
        assert_eq!(result.label, SoundLabel::FireAlarm);
        assert_eq!(result.source, ClassificationSource::Local);
        assert!(result.confidence > 0.8);
    }

    #[test]
    fn test_low_tone_is_car_horn() {
        let classifier = LocalClassifier::new();
        let window = AudioWindow::new(0, 16000, sine_wave(480.0, 16000, 2048, 0.5));

        let result = classifier.classify_window(&window).unwrap();
        assert_eq!(result.label, SoundLabel::CarHorn);
    }

    #[tokio::test]
    async fn test_async_classify_matches_sync() {
        let classifier = LocalClassifier::new();
        let window = AudioWindow::new(3, 16000, sine_wave(3100.0, 16000, 2048, 0.5));

        let result = SoundClassifier::classify(&classifier, &window).await.unwrap();
        assert_eq!(result, classifier.classify_window(&window).unwrap());

        let silent = AudioWindow::new(4, 16000, vec![0.0; 2048]);
        assert!(matches!(
            SoundClassifier::classify(&classifier, &silent).await,
            Err(ClassifierError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_identical_windows_give_identical_results() {
        let classifier = LocalClassifier::new();
        let samples = sine_wave(1250.0, 16000, 2048, 0.3);
        let a = classifier
            .classify_window(&AudioWindow::new(0, 16000, samples.clone()))
            .unwrap();
        let b = classifier
            .classify_window(&AudioWindow::new(9, 16000, samples))
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_ties_go_to_first_prototype() {
        let shared = SoundFeatures::profile(1000.0, 0.1, 0.2, 0.6, 0.2);
        let classifier = LocalClassifier::with_prototypes(vec![
            SoundPrototype {
                label: SoundLabel::Scream,
                features: shared.clone(),
            },
            SoundPrototype {
                label: SoundLabel::Doorbell,
                features: shared.clone(),
            },
        ]);

        let result = classifier.classify_features(&shared).unwrap();
        assert_eq!(result.label, SoundLabel::Scream);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_silent_and_empty_windows_are_rejected() {
        let classifier = LocalClassifier::new();

        let silent = AudioWindow::new(0, 16000, vec![0.0; 2048]);
        assert!(matches!(
            classifier.classify_window(&silent),
            Err(ClassifierError::InvalidWindow(_))
        ));

        let empty = AudioWindow::new(0, 16000, Vec::new());
        assert!(matches!(
            classifier.classify_window(&empty),
            Err(ClassifierError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_no_prototypes_is_unavailable() {
        let classifier = LocalClassifier::with_prototypes(Vec::new());
        let result = classifier.classify_features(&SoundFeatures::profile(1.0, 0.1, 0.3, 0.3, 0.4));
        assert!(matches!(result, Err(ClassifierError::Unavailable(_))));
    }
}
