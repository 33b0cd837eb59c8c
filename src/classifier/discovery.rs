// Backend capability discovery
// Probes every configured backend concurrently and reports which ones answered

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::classifier::backend::ClassifierBackend;

/// Health check for one classification backend
#[async_trait]
pub trait BackendProbe: Send + Sync {
    fn kind(&self) -> ClassifierBackend;

    async fn probe(&self) -> bool;
}

/// The on-device classifier needs no probing
pub struct LocalProbe;

#[async_trait]
impl BackendProbe for LocalProbe {
    fn kind(&self) -> ClassifierBackend {
        ClassifierBackend::Local
    }

    async fn probe(&self) -> bool {
        true
    }
}

/// Run all probes concurrently. A probe that errors or exceeds `timeout`
/// counts as unavailable.
pub async fn discover_backends(
    probes: &[Arc<dyn BackendProbe>],
    timeout: Duration,
) -> BTreeSet<ClassifierBackend> {
    let mut checks = JoinSet::new();
    for probe in probes {
        let probe = Arc::clone(probe);
        checks.spawn(async move {
            let kind = probe.kind();
            let available = tokio::time::timeout(timeout, probe.probe())
                .await
                .unwrap_or(false);
            (kind, available)
        });
    }

    let mut available = BTreeSet::new();
    while let Some(joined) = checks.join_next().await {
        match joined {
            Ok((kind, true)) => {
                available.insert(kind);
            }
            Ok((kind, false)) => log::info!("{} classifier backend unavailable", kind.as_str()),
            Err(err) => log::warn!("Backend probe task failed: {}", err),
        }
    }

    log::info!(
        "Available classifier backends: {:?}",
        available.iter().map(|b| b.as_str()).collect::<Vec<_>>()
    );
    available
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[async_trait]
    impl BackendProbe for Slow {
        fn kind(&self) -> ClassifierBackend {
            ClassifierBackend::Remote
        }

        async fn probe(&self) -> bool {
            tokio::time::sleep(Duration::from_secs(30)).await;
            true
        }
    }

    struct Down;

    #[async_trait]
    impl BackendProbe for Down {
        fn kind(&self) -> ClassifierBackend {
            ClassifierBackend::Remote
        }

        async fn probe(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_local_always_available() {
        let probes: Vec<Arc<dyn BackendProbe>> = vec![Arc::new(LocalProbe), Arc::new(Down)];
        let available = discover_backends(&probes, Duration::from_millis(100)).await;

        assert_eq!(available.into_iter().collect::<Vec<_>>(), vec![ClassifierBackend::Local]);
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let probes: Vec<Arc<dyn BackendProbe>> = vec![Arc::new(Slow), Arc::new(LocalProbe)];
        let started = std::time::Instant::now();
        let available = discover_backends(&probes, Duration::from_millis(50)).await;

        assert!(!available.contains(&ClassifierBackend::Remote));
        assert!(available.contains(&ClassifierBackend::Local));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_no_probes() {
        assert!(discover_backends(&[], Duration::from_millis(10)).await.is_empty());
    }
}
