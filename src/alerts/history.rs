// Alert history
// Bounded newest-first alert list; readers take immutable snapshots

use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, RwLock};

use crate::alerts::alert::Alert;

/// Durable copy of the history, written after every append
pub trait HistoryMirror: Send + Sync {
    fn record(&self, alert: &Alert) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Bounded, newest-first collection of recent alerts
///
/// Appends replace the shared snapshot, so a reader holding an older snapshot
/// is never affected by later writes. Only the dispatcher appends.
pub struct HistoryStore {
    capacity: usize,
    snapshot: RwLock<Arc<VecDeque<Alert>>>,
}

impl HistoryStore {
    /// `capacity` is clamped to at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        HistoryStore {
            capacity,
            snapshot: RwLock::new(Arc::new(VecDeque::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the front; returns the evicted oldest alert on overflow
    pub fn append(&self, alert: Alert) -> Option<Alert> {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Copies only when a reader still holds the previous snapshot
        let alerts = Arc::make_mut(&mut *guard);
        alerts.push_front(alert);
        if alerts.len() > self.capacity {
            alerts.pop_back()
        } else {
            None
        }
    }

    /// Current contents, newest first
    pub fn snapshot(&self) -> Arc<VecDeque<Alert>> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Up to `k` most recent alerts, newest first
    pub fn recent(&self, k: usize) -> Vec<Alert> {
        self.snapshot().iter().take(k).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Replace the contents with previously stored alerts (newest first)
    pub fn seed(&self, alerts: Vec<Alert>) {
        let restored: VecDeque<Alert> = alerts.into_iter().take(self.capacity).collect();
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(restored);
    }
}
