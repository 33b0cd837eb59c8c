// Notification channels
// Visual flash, haptic pattern and audible tone outputs, each keyed by severity

use rodio::source::{SineWave, Source};
use rodio::{OutputStream, Sink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::alerts::policy::Severity;

/// How long a trigger waits for the audio thread to accept a tone
const TONE_ACK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Visual,
    Haptic,
    Audible,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Visual => "visual",
            ChannelKind::Haptic => "haptic",
            ChannelKind::Audible => "audible",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single channel. Never aborts a dispatch.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Output device unavailable: {0}")]
    Unavailable(String),

    #[error("Output device error: {0}")]
    Device(String),

    #[error("Invalid intensity: {0}")]
    InvalidIntensity(String),
}

/// One output mechanism for surfacing an alert
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    fn trigger(&self, severity: Severity) -> Result<(), ChannelError>;
}

/// Per-severity intensity with a default for unmapped levels
///
/// Unmapped severities use the medium entry, or `fallback` when medium is
/// missing too.
#[derive(Debug, Clone)]
pub struct IntensityTable<T> {
    entries: HashMap<Severity, T>,
    fallback: T,
}

impl<T: Clone> IntensityTable<T> {
    pub fn new(entries: HashMap<Severity, T>, fallback: T) -> Self {
        IntensityTable { entries, fallback }
    }

    pub fn resolve(&self, severity: Severity) -> T {
        self.entries
            .get(&severity)
            .or_else(|| self.entries.get(&Severity::Medium))
            .unwrap_or(&self.fallback)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Visual

pub const DEFAULT_FLASH_COLOUR: &str = "#eab308";

/// Device able to show a coloured flash
pub trait FlashSink: Send + Sync {
    fn flash(&self, colour: &str, duration: Duration) -> Result<(), ChannelError>;
}

pub struct VisualFlash {
    colours: IntensityTable<String>,
    duration: Duration,
    sink: Box<dyn FlashSink>,
}

impl VisualFlash {
    pub fn new(colours: IntensityTable<String>, duration: Duration, sink: Box<dyn FlashSink>) -> Self {
        VisualFlash {
            colours,
            duration,
            sink,
        }
    }
}

impl NotificationChannel for VisualFlash {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Visual
    }

    fn trigger(&self, severity: Severity) -> Result<(), ChannelError> {
        let colour = self.colours.resolve(severity);
        self.sink.flash(&colour, self.duration)
    }
}

/// Parse `#rrggbb`
pub fn parse_hex_colour(colour: &str) -> Result<(u8, u8, u8), ChannelError> {
    let hex = colour.strip_prefix('#').unwrap_or(colour);
    if hex.len() != 6 {
        return Err(ChannelError::InvalidIntensity(format!("colour '{}'", colour)));
    }

    let bytes = hex::decode(hex).map_err(|_| ChannelError::InvalidIntensity(format!("colour '{}'", colour)))?;
    Ok((bytes[0], bytes[1], bytes[2]))
}

/// Flashes a coloured bar on stderr using 24-bit ANSI colour
pub struct TerminalFlash;

impl FlashSink for TerminalFlash {
    fn flash(&self, colour: &str, duration: Duration) -> Result<(), ChannelError> {
        let (r, g, b) = parse_hex_colour(colour)?;
        let mut stderr = std::io::stderr().lock();
        writeln!(
            stderr,
            "\x1b[48;2;{};{};{}m{:width$}\x1b[0m",
            r,
            g,
            b,
            "",
            width = 40
        )
        .map_err(|e| ChannelError::Device(e.to_string()))?;
        log::debug!("Flashed {} for {} ms", colour, duration.as_millis());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Haptic

/// Vibration pattern in milliseconds: on, off, on, ...
pub type VibrationPattern = Vec<u64>;

pub fn default_vibration() -> VibrationPattern {
    vec![200, 100, 200]
}

pub trait HapticMotor: Send + Sync {
    fn vibrate(&self, pattern_ms: &[u64]) -> Result<(), ChannelError>;
}

pub struct HapticPattern {
    patterns: IntensityTable<VibrationPattern>,
    motor: Box<dyn HapticMotor>,
}

impl HapticPattern {
    pub fn new(patterns: IntensityTable<VibrationPattern>, motor: Box<dyn HapticMotor>) -> Self {
        HapticPattern { patterns, motor }
    }
}

impl NotificationChannel for HapticPattern {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Haptic
    }

    fn trigger(&self, severity: Severity) -> Result<(), ChannelError> {
        let pattern = self.patterns.resolve(severity);
        if pattern.is_empty() {
            return Err(ChannelError::InvalidIntensity(format!(
                "empty vibration pattern for {}",
                severity
            )));
        }
        self.motor.vibrate(&pattern)
    }
}

/// Motor for hosts without vibration hardware: records the pattern in the log
pub struct LoggedMotor;

impl HapticMotor for LoggedMotor {
    fn vibrate(&self, pattern_ms: &[u64]) -> Result<(), ChannelError> {
        let total: u64 = pattern_ms.iter().sum();
        log::info!("Vibrate {:?} ({} ms)", pattern_ms, total);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Audible

pub const DEFAULT_TONE_HZ: f32 = 400.0;

pub trait TonePlayer: Send + Sync {
    fn play(&self, frequency_hz: f32, duration: Duration) -> Result<(), ChannelError>;
}

pub struct AudibleTone {
    frequencies: IntensityTable<f32>,
    duration: Duration,
    player: Box<dyn TonePlayer>,
}

impl AudibleTone {
    pub fn new(frequencies: IntensityTable<f32>, duration: Duration, player: Box<dyn TonePlayer>) -> Self {
        AudibleTone {
            frequencies,
            duration,
            player,
        }
    }
}

impl NotificationChannel for AudibleTone {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Audible
    }

    fn trigger(&self, severity: Severity) -> Result<(), ChannelError> {
        let frequency = self.frequencies.resolve(severity);
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(ChannelError::InvalidIntensity(format!("tone {} Hz", frequency)));
        }
        self.player.play(frequency, self.duration)
    }
}

struct ToneRequest {
    frequency_hz: f32,
    duration: Duration,
    reply: SyncSender<Result<(), String>>,
}

/// Plays sine tones on the default output device
///
/// The output stream is not `Send`, so it lives on a dedicated thread that is
/// started on first use and fed through a channel.
pub struct RodioTonePlayer {
    tx: Mutex<Option<Sender<ToneRequest>>>,
    volume: f32,
}

impl RodioTonePlayer {
    pub fn new(volume: f32) -> Self {
        RodioTonePlayer {
            tx: Mutex::new(None),
            volume: volume.clamp(0.0, 1.0),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<ToneRequest>, ChannelError> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|e| ChannelError::Device(e.to_string()))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<ToneRequest>();
        let volume = self.volume;

        thread::Builder::new()
            .name("hearo-tone".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(stream: &mut Option<OutputStream>, sink: &mut Option<Sink>) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to open audio output: {}", e))?;
                        let new_sink =
                            Sink::try_new(&handle).map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(request) = rx.recv() {
                    let result = ensure_sink(&mut _stream, &mut sink).map(|_| {
                        if let Some(ref s) = sink {
                            s.append(
                                SineWave::new(request.frequency_hz)
                                    .take_duration(request.duration)
                                    .amplify(volume),
                            );
                        }
                    });
                    let _ = request.reply.send(result);
                }
            })
            .map_err(|e| ChannelError::Unavailable(e.to_string()))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }
}

impl Default for RodioTonePlayer {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl TonePlayer for RodioTonePlayer {
    fn play(&self, frequency_hz: f32, duration: Duration) -> Result<(), ChannelError> {
        let tx = self.ensure_thread()?;
        let (reply, ack) = mpsc::sync_channel(1);

        tx.send(ToneRequest {
            frequency_hz,
            duration,
            reply,
        })
        .map_err(|_| ChannelError::Unavailable("tone thread stopped".to_string()))?;

        match ack.recv_timeout(TONE_ACK_TIMEOUT) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(ChannelError::Unavailable(message)),
            Err(_) => Err(ChannelError::Device("tone thread did not respond".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    struct RecordingSink(Arc<Recorder>);

    impl FlashSink for RecordingSink {
        fn flash(&self, colour: &str, _duration: Duration) -> Result<(), ChannelError> {
            self.0.calls.lock().unwrap().push(colour.to_string());
            Ok(())
        }
    }

    struct RecordingMotor(Arc<Recorder>);

    impl HapticMotor for RecordingMotor {
        fn vibrate(&self, pattern_ms: &[u64]) -> Result<(), ChannelError> {
            self.0.calls.lock().unwrap().push(format!("{:?}", pattern_ms));
            Ok(())
        }
    }

    struct RecordingPlayer(Arc<Recorder>);

    impl TonePlayer for RecordingPlayer {
        fn play(&self, frequency_hz: f32, _duration: Duration) -> Result<(), ChannelError> {
            self.0.calls.lock().unwrap().push(format!("{}", frequency_hz));
            Ok(())
        }
    }

    fn table<T: Clone>(entries: Vec<(Severity, T)>, fallback: T) -> IntensityTable<T> {
        IntensityTable::new(entries.into_iter().collect(), fallback)
    }

    #[test]
    fn test_intensity_table_defaults() {
        let with_medium = table(vec![(Severity::Critical, 800.0), (Severity::Medium, 400.0)], 1.0);
        assert_eq!(with_medium.resolve(Severity::Critical), 800.0);
        assert_eq!(with_medium.resolve(Severity::Low), 400.0);

        let without_medium = table(vec![(Severity::Critical, 800.0)], 1.0);
        assert_eq!(without_medium.resolve(Severity::High), 1.0);
    }

    #[test]
    fn test_visual_flash_uses_severity_colour() {
        let recorder = Arc::new(Recorder::default());
        let channel = VisualFlash::new(
            table(vec![(Severity::Critical, "#ef4444".to_string())], DEFAULT_FLASH_COLOUR.to_string()),
            Duration::from_millis(300),
            Box::new(RecordingSink(recorder.clone())),
        );

        channel.trigger(Severity::Critical).unwrap();
        channel.trigger(Severity::Low).unwrap();

        assert_eq!(channel.kind(), ChannelKind::Visual);
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["#ef4444", DEFAULT_FLASH_COLOUR]);
    }

    #[test]
    fn test_haptic_rejects_empty_pattern() {
        let recorder = Arc::new(Recorder::default());
        let channel = HapticPattern::new(
            table(vec![(Severity::Low, Vec::new()), (Severity::High, vec![300, 100, 300])], default_vibration()),
            Box::new(RecordingMotor(recorder.clone())),
        );

        assert!(matches!(
            channel.trigger(Severity::Low),
            Err(ChannelError::InvalidIntensity(_))
        ));
        channel.trigger(Severity::High).unwrap();
        channel.trigger(Severity::Critical).unwrap();

        assert_eq!(*recorder.calls.lock().unwrap(), vec!["[300, 100, 300]", "[200, 100, 200]"]);
    }

    #[test]
    fn test_audible_tone_frequency() {
        let recorder = Arc::new(Recorder::default());
        let channel = AudibleTone::new(
            table(vec![(Severity::High, 600.0), (Severity::Medium, -5.0)], DEFAULT_TONE_HZ),
            Duration::from_millis(500),
            Box::new(RecordingPlayer(recorder.clone())),
        );

        channel.trigger(Severity::High).unwrap();
        assert!(channel.trigger(Severity::Medium).is_err());
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["600"]);
    }

    #[test]
    fn test_parse_hex_colour() {
        assert_eq!(parse_hex_colour("#ef4444").unwrap(), (0xef, 0x44, 0x44));
        assert_eq!(parse_hex_colour("22c55e").unwrap(), (0x22, 0xc5, 0x5e));
        assert!(parse_hex_colour("#fff").is_err());
        assert!(parse_hex_colour("#zzzzzz").is_err());
    }

    #[test]
    fn test_terminal_flash_rejects_bad_colour() {
        assert!(TerminalFlash.flash("red", Duration::from_millis(10)).is_err());
        assert!(LoggedMotor.vibrate(&[100]).is_ok());
    }
}
