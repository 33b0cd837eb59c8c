// Hearo application state
// Wires config, persistence, classifiers, channels and the listener together

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::alerts::channels::{
    default_vibration, HapticPattern, IntensityTable, LoggedMotor, RodioTonePlayer, TerminalFlash, VisualFlash,
    DEFAULT_FLASH_COLOUR, DEFAULT_TONE_HZ,
};
use crate::alerts::{
    Alert, AlertDispatcher, AlertSequencer, AudibleTone, ChannelKind, HistoryStore, NotificationChannel, PolicyTable,
};
use crate::audio::{AcquisitionError, AudioError, FrameSource, MicrophoneSource, WavSource};
use crate::classifier::{
    discover_backends, BackendProbe, Classification, ClassificationSource, ClassifierBackend, ClassifierError,
    FallbackClassifier, HttpClassifier, LocalClassifier, LocalProbe, SoundLabel,
};
use crate::config::{AppConfig, ChannelsConfig, ConfigError};
use crate::pipeline::{Listener, ListenerError, ListenerState, TraceWriter};
use crate::state::{self, DbConnection, DbError, StorageError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Confidence {0} outside [0, 1]")]
    InvalidConfidence(f32),
}

/// Snapshot of what the application is doing
#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub listener: ListenerState,
    pub backends: Vec<ClassifierBackend>,
    pub channels: Vec<ChannelKind>,
    pub history_len: usize,
    pub history_capacity: usize,
    pub persisted: bool,
}

/// The whole application, passed by reference to whoever drives it
pub struct HearoApp {
    config: AppConfig,
    history: Arc<HistoryStore>,
    dispatcher: Arc<AlertDispatcher>,
    classifier: Arc<FallbackClassifier>,
    backends: BTreeSet<ClassifierBackend>,
    db: Option<DbConnection>,
    listener: Mutex<Option<Arc<Listener>>>,
}

impl HearoApp {
    /// Build the application with the hardware-backed channels
    pub async fn init(config: AppConfig) -> Result<Self, AppError> {
        let channels = build_channels(&config.channels);
        Self::init_with_channels(config, channels).await
    }

    pub async fn init_with_channels(
        config: AppConfig,
        channels: Vec<Box<dyn NotificationChannel>>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let history = Arc::new(HistoryStore::new(config.history_capacity));
        let db = if config.persist_history {
            Some(open_history_db(&config, &history)?)
        } else {
            None
        };

        let sequencer = match &db {
            Some(db) => match state::latest_alert_marker(db)? {
                Some((id, at)) => AlertSequencer::starting_after(id, Some(at)),
                None => AlertSequencer::new(),
            },
            None => AlertSequencer::new(),
        };

        let mut dispatcher = AlertDispatcher::new(PolicyTable::standard(), Arc::clone(&history)).with_sequencer(sequencer);
        for channel in channels {
            dispatcher = dispatcher.with_channel(channel);
        }
        if let Some(db) = &db {
            dispatcher = dispatcher.with_mirror(Box::new(db.clone()));
        }

        let (classifier, backends) = build_classifier(&config).await?;

        log::info!(
            "Hearo ready: backends {:?}, channels {:?}, history {}/{}",
            backends.iter().map(|b| b.as_str()).collect::<Vec<_>>(),
            dispatcher.channel_kinds().iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            history.len(),
            history.capacity()
        );

        Ok(HearoApp {
            config,
            history,
            dispatcher: Arc::new(dispatcher),
            classifier: Arc::new(classifier),
            backends,
            db,
            listener: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backends(&self) -> &BTreeSet<ClassifierBackend> {
        &self.backends
    }

    /// Start a listening session on `source`
    pub fn start_listening(&self, source: Box<dyn FrameSource>) -> Result<Arc<Listener>, AppError> {
        let mut current = self
            .listener
            .lock()
            .map_err(|e| ListenerError::Session(e.to_string()))?;
        if current.as_ref().is_some_and(|l| l.is_active()) {
            return Err(ListenerError::AlreadyStarted.into());
        }

        if source.sample_rate() != self.config.sample_rate {
            log::warn!(
                "Source runs at {} Hz, expected {} Hz; features are computed at the source rate",
                source.sample_rate(),
                self.config.sample_rate
            );
        }

        let mut listener = Listener::new(
            Arc::clone(&self.classifier),
            Arc::clone(&self.dispatcher),
            self.config.listener_settings(),
        );
        if let Some(path) = &self.config.trace_path {
            listener = listener.with_trace(TraceWriter::new(path.clone()));
        }

        let listener = Arc::new(listener);
        listener.start(source)?;
        *current = Some(Arc::clone(&listener));
        Ok(listener)
    }

    /// Listen on the default microphone
    pub async fn listen_microphone(&self) -> Result<Arc<Listener>, AppError> {
        let ring_len = self.config.window_size;
        let source = tokio::task::spawn_blocking(move || MicrophoneSource::open(ring_len))
            .await
            .map_err(|e| AcquisitionError::StreamError(e.to_string()))??;
        self.start_listening(Box::new(source))
    }

    /// Replay a WAV file as if it were live input
    pub fn replay(&self, path: &Path) -> Result<Arc<Listener>, AppError> {
        let source = WavSource::open(path)?;
        log::info!("Replaying {} ({} windows)", path.display(), source.remaining_frames(self.config.window_size));
        self.start_listening(Box::new(source))
    }

    fn current_listener(&self) -> Option<Arc<Listener>> {
        match self.listener.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stop the current session, if any
    pub async fn stop(&self) -> Result<(), AppError> {
        if let Some(listener) = self.current_listener() {
            listener.stop().await?;
        }
        Ok(())
    }

    /// Wait for the current session to end on its own
    pub async fn wait(&self) -> Result<(), AppError> {
        if let Some(listener) = self.current_listener() {
            listener.wait().await?;
        }
        Ok(())
    }

    /// Dispatch a classification as if it came from the classifier
    pub fn simulate(&self, label: &str, confidence: f32, location: Option<&str>) -> Result<Alert, AppError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AppError::InvalidConfidence(confidence));
        }
        let classification = Classification::new(SoundLabel::parse(label), confidence, ClassificationSource::Local);
        Ok(self.dispatcher.dispatch_with_location(&classification, location))
    }

    /// Up to `k` most recent alerts from memory, newest first
    pub fn recent_alerts(&self, k: usize) -> Vec<Alert> {
        self.history.recent(k)
    }

    /// Up to `limit` stored alerts, falling back to memory when not persisting
    pub fn stored_alerts(&self, limit: usize) -> Result<Vec<Alert>, AppError> {
        match &self.db {
            Some(db) => Ok(state::list_recent_alerts(db, limit)?),
            None => Ok(self.history.recent(limit)),
        }
    }

    pub fn status(&self) -> AppStatus {
        AppStatus {
            listener: self
                .current_listener()
                .map(|l| l.state())
                .unwrap_or(ListenerState::Idle),
            backends: self.backends.iter().copied().collect(),
            channels: self.dispatcher.channel_kinds(),
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            persisted: self.db.is_some(),
        }
    }
}

fn open_history_db(config: &AppConfig, history: &HistoryStore) -> Result<DbConnection, AppError> {
    let path = match &config.database_path {
        Some(path) => path.clone(),
        None => state::default_database_path()?,
    };
    let db = state::init_db(&path)?;

    let cutoff = Utc::now() - ChronoDuration::days(i64::from(config.retention_days));
    let pruned = state::prune_older_than(&db, cutoff)?;
    if pruned > 0 {
        log::info!("Pruned {} alerts older than {} days", pruned, config.retention_days);
    }

    let restored = state::list_recent_alerts(&db, history.capacity())?;
    log::info!("Restored {} alerts from {}", restored.len(), path.display());
    history.seed(restored);

    Ok(db)
}

/// Remote stage first when its endpoint answers, local always last
async fn build_classifier(
    config: &AppConfig,
) -> Result<(FallbackClassifier, BTreeSet<ClassifierBackend>), AppError> {
    let timeout = config.classification_timeout();
    let remote = match &config.remote_endpoint {
        Some(endpoint) => Some(Arc::new(HttpClassifier::new(endpoint.clone(), timeout)?)),
        None => None,
    };

    let mut probes: Vec<Arc<dyn BackendProbe>> = vec![Arc::new(LocalProbe)];
    if let Some(remote) = &remote {
        probes.push(Arc::clone(remote) as Arc<dyn BackendProbe>);
    }
    let backends = discover_backends(&probes, timeout).await;

    let mut classifier = FallbackClassifier::new(timeout);
    if let Some(remote) = remote {
        if backends.contains(&ClassifierBackend::Remote) {
            classifier = classifier.with_stage(remote);
        }
    }
    classifier = classifier.with_stage(Arc::new(LocalClassifier::new()));

    Ok((classifier, backends))
}

/// Enabled channels, in visual, haptic, audible order
pub fn build_channels(config: &ChannelsConfig) -> Vec<Box<dyn NotificationChannel>> {
    let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

    if config.visual.enabled {
        channels.push(Box::new(VisualFlash::new(
            IntensityTable::new(config.visual.colours.clone(), DEFAULT_FLASH_COLOUR.to_string()),
            std::time::Duration::from_millis(config.visual.flash_ms),
            Box::new(TerminalFlash),
        )));
    }
    if config.haptic.enabled {
        channels.push(Box::new(HapticPattern::new(
            IntensityTable::new(config.haptic.patterns.clone(), default_vibration()),
            Box::new(LoggedMotor),
        )));
    }
    if config.audible.enabled {
        channels.push(Box::new(AudibleTone::new(
            IntensityTable::new(config.audible.frequencies.clone(), DEFAULT_TONE_HZ),
            std::time::Duration::from_millis(config.audible.tone_ms),
            Box::new(RodioTonePlayer::new(config.audible.volume)),
        )));
    }

    channels
}
