// Audio processing module
// Capture sources, WAV replay, capture windows and spectral features

pub mod capture;
pub mod features;
pub mod ingest;
pub mod window;

pub use capture::{AcquisitionError, MicrophoneSource};
pub use features::{extract_features, SoundFeatures};
pub use ingest::{ingest_wav, read_wav, AudioData, AudioError, WavSource};
pub use window::{activity_level, AudioWindow, FrameSource};
