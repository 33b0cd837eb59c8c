// Classification types
// Sound labels the product recognizes and the judgments classifiers return

use serde::{Deserialize, Serialize};
use std::fmt;

/// Household sound a classifier can report
///
/// Remote backends may answer with labels this build does not know; those
/// are kept verbatim as `Unrecognized` and handled by the default policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SoundLabel {
    FireAlarm,
    SmokeDetector,
    Doorbell,
    PhoneRing,
    BabyCry,
    CarHorn,
    GlassBreak,
    Scream,
    Unrecognized(String),
}

impl SoundLabel {
    /// Every known label, in tie-break order
    pub const ALL: [SoundLabel; 8] = [
        SoundLabel::FireAlarm,
        SoundLabel::SmokeDetector,
        SoundLabel::Doorbell,
        SoundLabel::PhoneRing,
        SoundLabel::BabyCry,
        SoundLabel::CarHorn,
        SoundLabel::GlassBreak,
        SoundLabel::Scream,
    ];

    /// Parse a wire label. Accepts snake_case and PascalCase.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "fire_alarm" | "FireAlarm" => SoundLabel::FireAlarm,
            "smoke_detector" | "SmokeDetector" => SoundLabel::SmokeDetector,
            "doorbell" | "Doorbell" => SoundLabel::Doorbell,
            "phone_ring" | "PhoneRing" => SoundLabel::PhoneRing,
            "baby_cry" | "BabyCry" => SoundLabel::BabyCry,
            "car_horn" | "CarHorn" => SoundLabel::CarHorn,
            "glass_break" | "GlassBreak" => SoundLabel::GlassBreak,
            "scream" | "Scream" => SoundLabel::Scream,
            other => SoundLabel::Unrecognized(other.to_string()),
        }
    }

    /// Wire representation (snake_case)
    pub fn as_str(&self) -> &str {
        match self {
            SoundLabel::FireAlarm => "fire_alarm",
            SoundLabel::SmokeDetector => "smoke_detector",
            SoundLabel::Doorbell => "doorbell",
            SoundLabel::PhoneRing => "phone_ring",
            SoundLabel::BabyCry => "baby_cry",
            SoundLabel::CarHorn => "car_horn",
            SoundLabel::GlassBreak => "glass_break",
            SoundLabel::Scream => "scream",
            SoundLabel::Unrecognized(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, SoundLabel::Unrecognized(_))
    }
}

impl fmt::Display for SoundLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SoundLabel {
    fn from(s: String) -> Self {
        SoundLabel::parse(&s)
    }
}

impl From<SoundLabel> for String {
    fn from(label: SoundLabel) -> Self {
        label.as_str().to_string()
    }
}

/// Where a classification was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Local,
    Remote,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Local => "local",
            ClassificationSource::Remote => "remote",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(ClassificationSource::Local),
            "remote" => Some(ClassificationSource::Remote),
            _ => None,
        }
    }
}

/// A (label, confidence) judgment about one capture window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: SoundLabel,

    /// Confidence in [0.0, 1.0]
    pub confidence: f32,

    pub source: ClassificationSource,

    /// Time spent classifying, including any failed attempts before this one
    pub latency_ms: u64,
}

impl Classification {
    /// Confidence is clamped into [0.0, 1.0]; NaN becomes 0.0
    pub fn new(label: SoundLabel, confidence: f32, source: ClassificationSource) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Classification {
            label,
            confidence,
            source,
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Confidence as a whole percentage
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}
