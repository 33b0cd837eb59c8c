// Classifier backend abstraction
// The classifier port, its error taxonomy, and the remote-then-local fallback chain

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::audio::AudioWindow;
use crate::classifier::types::Classification;

/// Classification backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// On-device feature classifier, always available
    Local,

    /// Request/response classifier behind a network endpoint
    Remote,
}

impl ClassifierBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierBackend::Local => "local",
            ClassifierBackend::Remote => "remote",
        }
    }
}

/// Errors that can occur during classification
///
/// None of these reach the end user: the fallback chain absorbs them and a
/// window that no backend can classify is dropped.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("{backend:?} classifier timed out after {timeout_ms} ms")]
    Timeout {
        backend: ClassifierBackend,
        timeout_ms: u64,
    },

    #[error("Window cannot be classified: {0}")]
    InvalidWindow(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    #[error("No classifier stages configured")]
    NoStages,
}

/// The classifier port: turns one capture window into a classification.
/// Implementations must return the same result for identical windows.
#[async_trait]
pub trait SoundClassifier: Send + Sync {
    fn backend(&self) -> ClassifierBackend;

    async fn classify(&self, window: &AudioWindow) -> Result<Classification, ClassifierError>;
}

/// Ordered chain of classifiers. Each stage gets a bounded time budget;
/// a stage that fails or times out hands the window to the next one.
pub struct FallbackClassifier {
    stages: Vec<Arc<dyn SoundClassifier>>,
    stage_timeout: Duration,
}

impl FallbackClassifier {
    pub fn new(stage_timeout: Duration) -> Self {
        FallbackClassifier {
            stages: Vec::new(),
            stage_timeout,
        }
    }

    /// Append a stage; earlier stages are preferred
    pub fn with_stage(mut self, stage: Arc<dyn SoundClassifier>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Backends in the order they are tried
    pub fn backends(&self) -> Vec<ClassifierBackend> {
        self.stages.iter().map(|s| s.backend()).collect()
    }

    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    /// Classify a window, falling through the stages in order.
    /// Returns the last stage's error when every stage fails.
    pub async fn classify(&self, window: &AudioWindow) -> Result<Classification, ClassifierError> {
        let started = Instant::now();
        let mut last_error = ClassifierError::NoStages;

        for stage in &self.stages {
            let backend = stage.backend();
            match tokio::time::timeout(self.stage_timeout, stage.classify(window)).await {
                Ok(Ok(classification)) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    log::debug!(
                        "Window {} classified by {} as {} ({}%) in {} ms",
                        window.sequence,
                        backend.as_str(),
                        classification.label,
                        classification.percent(),
                        latency_ms
                    );
                    return Ok(classification.with_latency(latency_ms));
                }
                Ok(Err(err)) => {
                    log::warn!(
                        "{} classifier failed on window {}, falling back: {}",
                        backend.as_str(),
                        window.sequence,
                        err
                    );
                    last_error = err;
                }
                Err(_) => {
                    let timeout_ms = self.stage_timeout.as_millis() as u64;
                    log::warn!(
                        "{} classifier exceeded {} ms on window {}, falling back",
                        backend.as_str(),
                        timeout_ms,
                        window.sequence
                    );
                    last_error = ClassifierError::Timeout { backend, timeout_ms };
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::types::{ClassificationSource, SoundLabel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SoundClassifier for Failing {
        fn backend(&self) -> ClassifierBackend {
            ClassifierBackend::Remote
        }

        async fn classify(&self, _window: &AudioWindow) -> Result<Classification, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ClassifierError::Unavailable("endpoint down".to_string()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl SoundClassifier for Hanging {
        fn backend(&self) -> ClassifierBackend {
            ClassifierBackend::Remote
        }

        async fn classify(&self, _window: &AudioWindow) -> Result<Classification, ClassifierError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ClassifierError::Unavailable("unreachable".to_string()))
        }
    }

    struct Fixed(SoundLabel);

    #[async_trait]
    impl SoundClassifier for Fixed {
        fn backend(&self) -> ClassifierBackend {
            ClassifierBackend::Local
        }

        async fn classify(&self, _window: &AudioWindow) -> Result<Classification, ClassifierError> {
            Ok(Classification::new(self.0.clone(), 0.8, ClassificationSource::Local))
        }
    }

    fn window() -> AudioWindow {
        AudioWindow::new(3, 16000, vec![0.5; 64])
    }

    #[tokio::test]
    async fn test_falls_back_after_failure() {
        let failing = Arc::new(Failing {
            calls: AtomicUsize::new(0),
        });
        let chain = FallbackClassifier::new(Duration::from_millis(200))
            .with_stage(failing.clone())
            .with_stage(Arc::new(Fixed(SoundLabel::Doorbell)));

        let result = chain.classify(&window()).await.unwrap();
        assert_eq!(result.label, SoundLabel::Doorbell);
        assert_eq!(result.source, ClassificationSource::Local);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falls_back_after_timeout() {
        let chain = FallbackClassifier::new(Duration::from_millis(50))
            .with_stage(Arc::new(Hanging))
            .with_stage(Arc::new(Fixed(SoundLabel::CarHorn)));

        let started = Instant::now();
        let result = chain.classify(&window()).await.unwrap();

        assert_eq!(result.label, SoundLabel::CarHorn);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(result.latency_ms >= 50);
    }

    #[tokio::test]
    async fn test_all_stages_failing_reports_last_error() {
        let chain = FallbackClassifier::new(Duration::from_millis(50)).with_stage(Arc::new(Failing {
            calls: AtomicUsize::new(0),
        }));

        let err = chain.classify(&window()).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = FallbackClassifier::new(Duration::from_millis(50));
        let err = chain.classify(&window()).await.unwrap_err();
        assert!(matches!(err, ClassifierError::NoStages));
        assert!(chain.backends().is_empty());
    }
}
