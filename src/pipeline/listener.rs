// Listening session controller
// Fixed-cadence capture loop feeding an ordered dispatch loop

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::alerts::AlertDispatcher;
use crate::audio::{AcquisitionError, AudioWindow, FrameSource};
use crate::classifier::{Classification, ClassifierError, FallbackClassifier};
use crate::pipeline::state::{transition, ListenerEvent, ListenerState};
use crate::pipeline::trace::{TraceEntry, TraceStage, TraceWriter};

/// Capture and dispatch tuning for one listener
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// Samples per capture window
    pub window_size: usize,

    /// Time between window captures
    pub capture_interval: Duration,

    /// Windows with a level below this are not classified
    pub activity_threshold: f32,

    /// Classifications below this confidence are not dispatched
    pub min_confidence: f32,

    /// Classifications allowed in flight; further windows are dropped
    pub max_pending_windows: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        ListenerSettings {
            window_size: 2048,
            capture_interval: Duration::from_millis(3000),
            activity_threshold: 0.3,
            min_confidence: 0.0,
            max_pending_windows: 4,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ListenerError {
    #[error("Listener already started")]
    AlreadyStarted,

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("Listening session failed: {0}")]
    Session(String),
}

type ClassificationTask = JoinHandle<Result<Classification, ClassifierError>>;

/// A window whose classification is running
struct PendingWindow {
    sequence: u64,
    task: ClassificationTask,
}

/// Everything both loops share
struct Session {
    id: Uuid,
    classifier: Arc<FallbackClassifier>,
    dispatcher: Arc<AlertDispatcher>,
    settings: ListenerSettings,
    trace: Option<Arc<TraceWriter>>,
    state: watch::Sender<ListenerState>,
    outcome: Mutex<Option<Result<(), ListenerError>>>,
}

impl Session {
    fn apply(&self, event: ListenerEvent) {
        self.state.send_modify(|state| *state = transition(*state, event));
    }

    /// Record how the session ended and publish Stopped
    fn finish(&self, result: Result<(), ListenerError>) {
        match self.outcome.lock() {
            Ok(mut outcome) => *outcome = Some(result),
            Err(poisoned) => *poisoned.into_inner() = Some(result),
        }
        self.apply(ListenerEvent::Stop);
    }

    fn outcome(&self) -> Result<(), ListenerError> {
        let outcome = match self.outcome.lock() {
            Ok(outcome) => outcome,
            Err(poisoned) => poisoned.into_inner(),
        };
        outcome.clone().unwrap_or(Ok(()))
    }

    fn trace(&self, window: Option<u64>, stage: TraceStage, message: impl Into<String>, data: Option<serde_json::Value>) {
        if let Some(writer) = &self.trace {
            let mut entry = TraceEntry::new(self.id, window, stage, message);
            if let Some(data) = data {
                entry = entry.with_data(data);
            }
            writer.record(entry);
        }
    }
}

/// One listening session: Idle until started, Stopped for good once stopped
///
/// Windows are captured on a fixed cadence and classified concurrently;
/// alerts are dispatched strictly in capture order. After `stop` returns no
/// further alert reaches the history.
pub struct Listener {
    session: Arc<Session>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    pub fn new(
        classifier: Arc<FallbackClassifier>,
        dispatcher: Arc<AlertDispatcher>,
        settings: ListenerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        Listener {
            session: Arc::new(Session {
                id: Uuid::new_v4(),
                classifier,
                dispatcher,
                settings,
                trace: None,
                state,
                outcome: Mutex::new(None),
            }),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Record window lifecycle to a JSONL trace. Only before `start`.
    pub fn with_trace(mut self, writer: TraceWriter) -> Self {
        if let Some(session) = Arc::get_mut(&mut self.session) {
            session.trace = Some(Arc::new(writer));
        }
        self
    }

    pub fn state(&self) -> ListenerState {
        *self.session.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.session.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Begin capturing from `source`. Must be called inside a Tokio runtime.
    pub fn start(&self, source: Box<dyn FrameSource>) -> Result<(), ListenerError> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|e| ListenerError::Session(e.to_string()))?;
        if handle.is_some() || self.state() != ListenerState::Idle {
            return Err(ListenerError::AlreadyStarted);
        }

        self.session.apply(ListenerEvent::Start);
        self.session.trace(
            None,
            TraceStage::SessionStarted,
            "listening",
            Some(json!({
                "sample_rate": source.sample_rate(),
                "window_size": self.session.settings.window_size,
                "capture_interval_ms": self.session.settings.capture_interval.as_millis() as u64,
            })),
        );
        log::info!(
            "Listening session {} started ({} Hz, {} samples every {} ms)",
            self.session.id,
            source.sample_rate(),
            self.session.settings.window_size,
            self.session.settings.capture_interval.as_millis()
        );

        *handle = Some(tokio::spawn(run_session(
            Arc::clone(&self.session),
            source,
            self.cancel.clone(),
        )));
        Ok(())
    }

    /// Cancel capture and in-flight classification and wait for both loops to exit
    pub async fn stop(&self) -> Result<(), ListenerError> {
        self.cancel.cancel();
        {
            let handle = self
                .handle
                .lock()
                .map_err(|e| ListenerError::Session(e.to_string()))?;
            if handle.is_none() {
                // Never started: retire it so it cannot start later
                self.session.apply(ListenerEvent::Stop);
                return Ok(());
            }
        }
        self.finish().await
    }

    /// Wait for the session to end on its own (source exhausted or lost).
    /// Returns at once for a listener that was never started.
    pub async fn wait(&self) -> Result<(), ListenerError> {
        let started = self
            .handle
            .lock()
            .map_err(|e| ListenerError::Session(e.to_string()))?
            .is_some();
        if !started {
            return Ok(());
        }
        self.finish().await
    }

    /// Every caller sees the same outcome, however many wait at once
    async fn finish(&self) -> Result<(), ListenerError> {
        // The session task publishes Stopped only after both loops have exited
        let mut state = self.subscribe();
        if state.wait_for(|s| *s == ListenerState::Stopped).await.is_err() {
            return Err(ListenerError::Session("state channel closed".to_string()));
        }
        self.session.outcome()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_session(session: Arc<Session>, source: Box<dyn FrameSource>, cancel: CancellationToken) {
    let (pending_tx, pending_rx) = mpsc::channel(session.settings.max_pending_windows.max(1));

    let dispatcher = tokio::spawn(dispatch_loop(Arc::clone(&session), pending_rx, cancel.clone()));
    let captured = capture_loop(&session, source, pending_tx, &cancel).await;

    let dispatched = match dispatcher.await {
        Ok(result) => result,
        Err(err) => Err(ListenerError::Session(format!("dispatch loop failed: {}", err))),
    };

    let result = captured.map_err(ListenerError::from).and(dispatched);
    match &result {
        Ok(()) => log::info!("Listening session {} stopped", session.id),
        Err(ListenerError::Acquisition(err)) => {
            log::error!("Listening session {} lost its audio input: {}", session.id, err)
        }
        Err(err) => log::error!("Listening session {} ended: {}", session.id, err),
    }
    session.trace(
        None,
        TraceStage::SessionStopped,
        match &result {
            Ok(()) => "stopped".to_string(),
            Err(err) => err.to_string(),
        },
        None,
    );
    session.finish(result);
}

async fn capture_loop(
    session: &Session,
    mut source: Box<dyn FrameSource>,
    pending: mpsc::Sender<PendingWindow>,
    cancel: &CancellationToken,
) -> Result<(), AcquisitionError> {
    let settings = &session.settings;
    let mut ticker = tokio::time::interval(settings.capture_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        session.apply(ListenerEvent::CaptureTick);
        let frame = match source.read_frame(settings.window_size) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("Audio source exhausted after {} windows", sequence);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let window = AudioWindow::new(sequence, source.sample_rate(), frame);
        sequence += 1;

        let level = window.level();
        if level < settings.activity_threshold {
            session.apply(ListenerEvent::WindowSkipped);
            session.trace(
                Some(window.sequence),
                TraceStage::Skipped,
                "below activity threshold",
                Some(json!({ "level": level })),
            );
            continue;
        }

        session.apply(ListenerEvent::WindowCaptured);
        session.trace(
            Some(window.sequence),
            TraceStage::Captured,
            window.digest(),
            Some(json!({ "level": level })),
        );

        let window_sequence = window.sequence;
        let classifier = Arc::clone(&session.classifier);
        let task = tokio::spawn(async move { classifier.classify(&window).await });

        match pending.try_send(PendingWindow {
            sequence: window_sequence,
            task,
        }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(window)) => {
                window.task.abort();
                log::warn!(
                    "Dropping window {}: {} classifications already pending",
                    window.sequence,
                    settings.max_pending_windows
                );
                session.trace(Some(window.sequence), TraceStage::Dropped, "classification backlog full", None);
            }
            Err(mpsc::error::TrySendError::Closed(window)) => {
                window.task.abort();
                return Ok(());
            }
        }
    }
}

async fn dispatch_loop(
    session: Arc<Session>,
    mut pending: mpsc::Receiver<PendingWindow>,
    cancel: CancellationToken,
) -> Result<(), ListenerError> {
    let result = dispatch_in_order(&session, &mut pending, &cancel).await;
    if result.is_err() {
        // Ends capture too; nothing would dispatch its windows
        cancel.cancel();
    }

    pending.close();
    while let Ok(window) = pending.try_recv() {
        window.task.abort();
    }
    result
}

async fn dispatch_in_order(
    session: &Arc<Session>,
    pending: &mut mpsc::Receiver<PendingWindow>,
    cancel: &CancellationToken,
) -> Result<(), ListenerError> {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            next = pending.recv() => next,
        };
        let Some(PendingWindow { sequence, mut task }) = next else {
            return Ok(());
        };

        // Awaiting in arrival order keeps dispatch in capture order
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                task.abort();
                return Ok(());
            }
            joined = &mut task => joined,
        };

        match joined {
            Ok(Ok(classification)) if classification.confidence >= session.settings.min_confidence => {
                session.apply(ListenerEvent::ClassificationReady);
                session.trace(
                    Some(sequence),
                    TraceStage::Classified,
                    classification.label.to_string(),
                    Some(json!({
                        "confidence": classification.confidence,
                        "source": classification.source.as_str(),
                        "latency_ms": classification.latency_ms,
                    })),
                );

                if cancel.is_cancelled() {
                    return Ok(());
                }

                // Channels block (tone playback, SQLite); keep them off the runtime.
                // Awaited without cancellation so stop returns only after it lands.
                let dispatcher = Arc::clone(&session.dispatcher);
                let alert = match tokio::task::spawn_blocking(move || dispatcher.dispatch(&classification)).await {
                    Ok(alert) => alert,
                    Err(err) => {
                        session.trace(Some(sequence), TraceStage::Failed, err.to_string(), None);
                        return Err(ListenerError::Session(format!(
                            "dispatch of window {} failed: {}",
                            sequence, err
                        )));
                    }
                };

                session.apply(ListenerEvent::Dispatched);
                session.trace(
                    Some(sequence),
                    TraceStage::Dispatched,
                    alert.summary(),
                    Some(json!({ "alert_id": alert.id })),
                );
            }
            Ok(Ok(classification)) => {
                log::debug!(
                    "Window {} classified as {} below confidence floor ({}%)",
                    sequence,
                    classification.label,
                    classification.percent()
                );
                session.apply(ListenerEvent::ClassificationDropped);
                session.trace(
                    Some(sequence),
                    TraceStage::Dropped,
                    "below confidence floor",
                    Some(json!({ "label": classification.label.as_str(), "confidence": classification.confidence })),
                );
            }
            Ok(Err(err)) => {
                log::warn!("Window {} not classified: {}", sequence, err);
                session.apply(ListenerEvent::ClassificationDropped);
                session.trace(Some(sequence), TraceStage::Failed, err.to_string(), None);
            }
            Err(err) => {
                log::warn!("Classification task for window {} ended abnormally: {}", sequence, err);
                session.apply(ListenerEvent::ClassificationDropped);
                session.trace(Some(sequence), TraceStage::Failed, err.to_string(), None);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{ChannelError, ChannelKind, HistoryStore, NotificationChannel, PolicyTable, Severity};
    use crate::classifier::{ClassificationSource, ClassifierBackend, SoundClassifier, SoundLabel};
    use crate::pipeline::trace::read_trace_file;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Frames from memory; `Err` once `fail_after` frames have been read
    struct VecSource {
        frames: VecDeque<Vec<f32>>,
        fail_after: Option<usize>,
        read: usize,
    }

    impl VecSource {
        fn new(frames: Vec<Vec<f32>>) -> Self {
            VecSource {
                frames: frames.into(),
                fail_after: None,
                read: 0,
            }
        }
    }

    impl FrameSource for VecSource {
        fn sample_rate(&self) -> u32 {
            16000
        }

        fn read_frame(&mut self, len: usize) -> Result<Option<Vec<f32>>, AcquisitionError> {
            if self.fail_after == Some(self.read) {
                return Err(AcquisitionError::Disconnected("unplugged".to_string()));
            }
            self.read += 1;
            Ok(self.frames.pop_front().map(|mut frame| {
                frame.resize(len, 0.0);
                frame
            }))
        }
    }

    /// Never runs out of loud frames
    struct EndlessSource;

    impl FrameSource for EndlessSource {
        fn sample_rate(&self) -> u32 {
            16000
        }

        fn read_frame(&mut self, len: usize) -> Result<Option<Vec<f32>>, AcquisitionError> {
            Ok(Some(vec![0.5; len]))
        }
    }

    /// Loud frames forever, counting every read
    struct CountingSource {
        reads: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn sample_rate(&self) -> u32 {
            16000
        }

        fn read_frame(&mut self, len: usize) -> Result<Option<Vec<f32>>, AcquisitionError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(vec![0.5; len]))
        }
    }

    /// Same label for every window, immediately
    struct Always(SoundLabel);

    #[async_trait]
    impl SoundClassifier for Always {
        fn backend(&self) -> ClassifierBackend {
            ClassifierBackend::Local
        }

        async fn classify(&self, _window: &AudioWindow) -> Result<Classification, ClassifierError> {
            Ok(Classification::new(self.0.clone(), 0.9, ClassificationSource::Local))
        }
    }

    /// Blocks the calling thread like a tone that has to finish playing
    struct SlowChannel(Duration);

    impl NotificationChannel for SlowChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Audible
        }

        fn trigger(&self, _severity: Severity) -> Result<(), ChannelError> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    struct PanickingChannel;

    impl NotificationChannel for PanickingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Haptic
        }

        fn trigger(&self, _severity: Severity) -> Result<(), ChannelError> {
            panic!("motor driver crashed");
        }
    }

    /// Label and delay chosen per window sequence
    struct Scripted {
        script: Vec<(SoundLabel, f32, Duration)>,
    }

    #[async_trait]
    impl SoundClassifier for Scripted {
        fn backend(&self) -> ClassifierBackend {
            ClassifierBackend::Local
        }

        async fn classify(&self, window: &AudioWindow) -> Result<Classification, ClassifierError> {
            let (label, confidence, delay) = self
                .script
                .get(window.sequence as usize)
                .cloned()
                .ok_or_else(|| ClassifierError::InvalidWindow("unscripted".to_string()))?;
            tokio::time::sleep(delay).await;
            Ok(Classification::new(label, confidence, ClassificationSource::Local))
        }
    }

    fn loud() -> Vec<f32> {
        vec![0.5; 64]
    }

    fn quiet() -> Vec<f32> {
        vec![0.01; 64]
    }

    fn settings() -> ListenerSettings {
        ListenerSettings {
            window_size: 64,
            capture_interval: Duration::from_millis(10),
            activity_threshold: 0.3,
            min_confidence: 0.0,
            max_pending_windows: 4,
        }
    }

    fn listener(script: Vec<(SoundLabel, f32, Duration)>, settings: ListenerSettings) -> (Listener, Arc<HistoryStore>) {
        let history = Arc::new(HistoryStore::new(10));
        let dispatcher = Arc::new(AlertDispatcher::new(PolicyTable::standard(), Arc::clone(&history)));
        let classifier = Arc::new(
            FallbackClassifier::new(Duration::from_secs(5)).with_stage(Arc::new(Scripted { script })),
        );
        (Listener::new(classifier, dispatcher, settings), history)
    }

    fn listener_with_channel(
        classifier: Arc<dyn SoundClassifier>,
        channel: Box<dyn NotificationChannel>,
        settings: ListenerSettings,
    ) -> (Listener, Arc<HistoryStore>) {
        let history = Arc::new(HistoryStore::new(10));
        let dispatcher =
            Arc::new(AlertDispatcher::new(PolicyTable::standard(), Arc::clone(&history)).with_channel(channel));
        let classifier = Arc::new(FallbackClassifier::new(Duration::from_secs(5)).with_stage(classifier));
        (Listener::new(classifier, dispatcher, settings), history)
    }

    fn labels(history: &HistoryStore) -> Vec<SoundLabel> {
        history.recent(10).into_iter().map(|a| a.label).collect()
    }

    #[tokio::test]
    async fn test_dispatch_follows_capture_order() {
        let (listener, history) = listener(
            vec![
                (SoundLabel::Doorbell, 0.9, Duration::from_millis(200)),
                (SoundLabel::CarHorn, 0.9, Duration::from_millis(1)),
            ],
            settings(),
        );

        listener.start(Box::new(VecSource::new(vec![loud(), loud()]))).unwrap();
        listener.wait().await.unwrap();

        // Newest first: window 0 was dispatched before window 1
        assert_eq!(labels(&history), vec![SoundLabel::CarHorn, SoundLabel::Doorbell]);
        let recent = history.recent(2);
        assert!(recent[0].id > recent[1].id);
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_quiet_windows_are_not_classified() {
        let (listener, history) = listener(
            vec![
                (SoundLabel::Doorbell, 0.9, Duration::ZERO),
                (SoundLabel::Scream, 0.9, Duration::ZERO),
            ],
            settings(),
        );

        listener.start(Box::new(VecSource::new(vec![quiet(), loud()]))).unwrap();
        listener.wait().await.unwrap();

        assert_eq!(labels(&history), vec![SoundLabel::Scream]);
    }

    #[tokio::test]
    async fn test_low_confidence_is_dropped() {
        let mut settings = settings();
        settings.min_confidence = 0.5;
        let (listener, history) = listener(
            vec![
                (SoundLabel::Doorbell, 0.2, Duration::ZERO),
                (SoundLabel::PhoneRing, 0.8, Duration::ZERO),
            ],
            settings,
        );

        listener.start(Box::new(VecSource::new(vec![loud(), loud()]))).unwrap();
        listener.wait().await.unwrap();

        assert_eq!(labels(&history), vec![SoundLabel::PhoneRing]);
    }

    #[tokio::test]
    async fn test_failed_window_does_not_end_session() {
        // Window 1 has no script entry, so its classification fails
        let (listener, history) = listener(vec![(SoundLabel::Doorbell, 0.9, Duration::ZERO)], settings());

        listener.start(Box::new(VecSource::new(vec![loud(), loud(), loud()]))).unwrap();
        listener.wait().await.unwrap();

        assert_eq!(labels(&history), vec![SoundLabel::Doorbell]);
    }

    #[tokio::test]
    async fn test_acquisition_error_ends_session() {
        let (listener, history) = listener(vec![(SoundLabel::Doorbell, 0.9, Duration::ZERO)], settings());
        let mut source = VecSource::new(vec![loud(), loud()]);
        source.fail_after = Some(1);

        listener.start(Box::new(source)).unwrap();
        let err = listener.wait().await.unwrap_err();

        assert!(matches!(err, ListenerError::Acquisition(AcquisitionError::Disconnected(_))));
        assert_eq!(labels(&history), vec![SoundLabel::Doorbell]);
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_classification() {
        let slow = Duration::from_secs(30);
        let (listener, history) = listener(
            vec![
                (SoundLabel::FireAlarm, 0.9, slow),
                (SoundLabel::FireAlarm, 0.9, slow),
                (SoundLabel::FireAlarm, 0.9, slow),
            ],
            settings(),
        );

        listener.start(Box::new(EndlessSource)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(listener.is_active());

        tokio::time::timeout(Duration::from_secs(5), listener.stop())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(listener.state(), ListenerState::Stopped);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_listener_is_single_use() {
        let (listener, _) = listener(Vec::new(), settings());
        listener.stop().await.unwrap();

        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(matches!(
            listener.start(Box::new(EndlessSource)),
            Err(ListenerError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_session_trace() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("session.jsonl");
        let (listener, _) = listener(
            vec![
                (SoundLabel::Doorbell, 0.9, Duration::ZERO),
                (SoundLabel::Doorbell, 0.9, Duration::ZERO),
            ],
            settings(),
        );
        let listener = listener.with_trace(TraceWriter::new(trace_path.clone()));

        listener.start(Box::new(VecSource::new(vec![quiet(), loud()]))).unwrap();
        listener.wait().await.unwrap();

        let stages: Vec<TraceStage> = read_trace_file(&trace_path).unwrap().into_iter().map(|e| e.stage).collect();
        assert_eq!(stages.first(), Some(&TraceStage::SessionStarted));
        assert_eq!(stages.last(), Some(&TraceStage::SessionStopped));
        assert!(stages.contains(&TraceStage::Skipped));
        assert!(stages.contains(&TraceStage::Dispatched));
    }

    #[tokio::test]
    async fn test_slow_channel_does_not_stall_capture() {
        // Single-threaded runtime: a blocking dispatch on it would starve the ticker
        let reads = Arc::new(AtomicUsize::new(0));
        let mut settings = settings();
        settings.capture_interval = Duration::from_millis(20);
        let (listener, history) = listener_with_channel(
            Arc::new(Always(SoundLabel::Doorbell)),
            Box::new(SlowChannel(Duration::from_secs(1))),
            settings,
        );

        listener
            .start(Box::new(CountingSource {
                reads: Arc::clone(&reads),
            }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let captured = reads.load(Ordering::SeqCst);
        assert!(captured >= 10, "only {} windows captured in 500 ms", captured);

        tokio::time::timeout(Duration::from_secs(5), listener.stop())
            .await
            .unwrap()
            .unwrap();
        let settled = history.len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(history.len(), settled);
    }

    #[tokio::test]
    async fn test_panicking_channel_ends_session_with_error() {
        let (listener, history) = listener_with_channel(
            Arc::new(Always(SoundLabel::BabyCry)),
            Box::new(PanickingChannel),
            settings(),
        );

        listener.start(Box::new(EndlessSource)).unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), listener.wait())
            .await
            .unwrap()
            .unwrap_err();

        assert!(matches!(err, ListenerError::Session(_)));
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_wait_before_start_leaves_listener_usable() {
        let (listener, history) = listener(vec![(SoundLabel::Doorbell, 0.9, Duration::ZERO)], settings());

        listener.wait().await.unwrap();
        assert_eq!(listener.state(), ListenerState::Idle);

        listener.start(Box::new(VecSource::new(vec![loud()]))).unwrap();
        listener.wait().await.unwrap();
        assert_eq!(labels(&history), vec![SoundLabel::Doorbell]);
    }

    #[tokio::test]
    async fn test_every_waiter_sees_acquisition_error() {
        let (listener, _) = listener(Vec::new(), settings());
        let mut source = VecSource::new(vec![loud()]);
        source.fail_after = Some(0);

        listener.start(Box::new(source)).unwrap();
        let (first, second) = tokio::join!(listener.wait(), listener.wait());

        for result in [first, second, listener.stop().await] {
            assert!(matches!(
                result,
                Err(ListenerError::Acquisition(AcquisitionError::Disconnected(_)))
            ));
        }
    }
}
