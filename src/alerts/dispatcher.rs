// Alert dispatcher
// Classification -> policy lookup -> alert -> channels -> history

use std::sync::{Arc, Mutex};

use crate::alerts::alert::{Alert, AlertSequencer};
use crate::alerts::channels::{ChannelKind, NotificationChannel};
use crate::alerts::history::{HistoryMirror, HistoryStore};
use crate::alerts::policy::PolicyTable;
use crate::classifier::types::Classification;

/// Turns classifications into alerts
///
/// Dispatches are serialized: ids, timestamps and history order all follow
/// the order in which `dispatch` calls acquire the internal lock. Dispatch
/// never fails; channel and mirror failures are logged and skipped.
pub struct AlertDispatcher {
    policy: PolicyTable,
    channels: Vec<Box<dyn NotificationChannel>>,
    history: Arc<HistoryStore>,
    mirror: Option<Box<dyn HistoryMirror>>,
    sequencer: Mutex<AlertSequencer>,
}

impl AlertDispatcher {
    pub fn new(policy: PolicyTable, history: Arc<HistoryStore>) -> Self {
        AlertDispatcher {
            policy,
            channels: Vec::new(),
            history,
            mirror: None,
            sequencer: Mutex::new(AlertSequencer::new()),
        }
    }

    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_mirror(mut self, mirror: Box<dyn HistoryMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_sequencer(mut self, sequencer: AlertSequencer) -> Self {
        self.sequencer = Mutex::new(sequencer);
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    /// Dispatch at the label's default location
    pub fn dispatch(&self, classification: &Classification) -> Alert {
        self.dispatch_with_location(classification, None)
    }

    /// Dispatch, optionally overriding the policy location with a live reading
    pub fn dispatch_with_location(&self, classification: &Classification, location: Option<&str>) -> Alert {
        let mut sequencer = match self.sequencer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entry = self.policy.lookup(&classification.label);
        let (id, created_at) = sequencer.next();

        let location = match location.map(str::trim) {
            Some(reading) if !reading.is_empty() => reading.to_string(),
            _ => entry.default_location,
        };

        let alert = Alert {
            id,
            label: classification.label.clone(),
            category: entry.category,
            severity: entry.severity,
            location,
            confidence: classification.confidence,
            source: classification.source,
            created_at,
        };

        for channel in &self.channels {
            if let Err(err) = channel.trigger(alert.severity) {
                log::warn!("{} channel failed for alert {}: {}", channel.kind(), alert.id, err);
            }
        }

        self.history.append(alert.clone());

        if let Some(mirror) = &self.mirror {
            if let Err(err) = mirror.record(&alert) {
                log::warn!("Failed to persist alert {}: {}", alert.id, err);
            }
        }

        log::info!("Alert {}: {}", alert.id, alert.summary());
        alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::channels::ChannelError;
    use crate::alerts::policy::{Category, Severity};
    use crate::classifier::types::{ClassificationSource, SoundLabel};
    use std::error::Error;

    type Log = Arc<Mutex<Vec<(ChannelKind, Severity)>>>;

    struct Recording {
        kind: ChannelKind,
        fail: bool,
        log: Log,
    }

    impl NotificationChannel for Recording {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        fn trigger(&self, severity: Severity) -> Result<(), ChannelError> {
            self.log.lock().unwrap().push((self.kind, severity));
            if self.fail {
                Err(ChannelError::Device("motor stalled".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct BrokenMirror;

    impl HistoryMirror for BrokenMirror {
        fn record(&self, _alert: &Alert) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("disk full".into())
        }
    }

    fn dispatcher(capacity: usize, failing: Option<ChannelKind>) -> (AlertDispatcher, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = AlertDispatcher::new(PolicyTable::standard(), Arc::new(HistoryStore::new(capacity)));
        for kind in [ChannelKind::Visual, ChannelKind::Haptic, ChannelKind::Audible] {
            dispatcher = dispatcher.with_channel(Box::new(Recording {
                kind,
                fail: failing == Some(kind),
                log: log.clone(),
            }));
        }
        (dispatcher, log)
    }

    fn classification(label: &str, confidence: f32, source: ClassificationSource) -> Classification {
        Classification::new(SoundLabel::parse(label), confidence, source)
    }

    #[test]
    fn test_fire_alarm_scenario() {
        let (dispatcher, _) = dispatcher(10, None);
        let alert = dispatcher.dispatch(&classification("fire_alarm", 0.97, ClassificationSource::Remote));

        assert_eq!(alert.category, Category::Emergency);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.location, "Whole House");
        assert!((alert.confidence - 0.97).abs() < 1e-6);
        assert_eq!(alert.source, ClassificationSource::Remote);
    }

    #[test]
    fn test_doorbell_scenario() {
        let (dispatcher, _) = dispatcher(10, None);
        let alert = dispatcher.dispatch(&classification("doorbell", 0.94, ClassificationSource::Local));

        assert_eq!(alert.category, Category::Doorbell);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.location, "Front Door");
    }

    #[test]
    fn test_every_known_label_matches_policy() {
        let (dispatcher, _) = dispatcher(20, None);
        for label in SoundLabel::ALL {
            let entry = dispatcher.policy().lookup(&label);
            let alert = dispatcher.dispatch(&Classification::new(label.clone(), 0.5, ClassificationSource::Local));

            assert_eq!(alert.label, label);
            assert_eq!(alert.category, entry.category);
            assert_eq!(alert.severity, entry.severity);
            assert_eq!(alert.location, entry.default_location);
        }
    }

    #[test]
    fn test_unknown_label_uses_default_policy() {
        let (dispatcher, log) = dispatcher(10, None);
        let alert = dispatcher.dispatch(&classification("vacuum_cleaner", 0.7, ClassificationSource::Remote));

        assert_eq!(alert.category, Category::Unknown);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.location, "Unknown");
        assert_eq!(log.lock().unwrap().len(), 3);
        assert_eq!(dispatcher.history().len(), 1);
    }

    #[test]
    fn test_history_keeps_newest_three() {
        let (dispatcher, _) = dispatcher(3, None);
        let dispatched: Vec<Alert> = ["doorbell", "phone_ring", "car_horn", "baby_cry"]
            .iter()
            .map(|label| dispatcher.dispatch(&classification(label, 0.8, ClassificationSource::Local)))
            .collect();

        let recent = dispatcher.history().recent(3);
        assert_eq!(recent, vec![dispatched[3].clone(), dispatched[2].clone(), dispatched[1].clone()]);
    }

    #[test]
    fn test_ids_and_times_are_ordered() {
        let (dispatcher, _) = dispatcher(10, None);
        let a = dispatcher.dispatch(&classification("doorbell", 0.8, ClassificationSource::Local));
        let b = dispatcher.dispatch(&classification("doorbell", 0.8, ClassificationSource::Local));

        assert!(b.id > a.id);
        assert!(b.created_at >= a.created_at);
    }

    #[test]
    fn test_haptic_failure_is_isolated() {
        let (dispatcher, log) = dispatcher(10, Some(ChannelKind::Haptic));
        let alert = dispatcher.dispatch(&classification("smoke_detector", 0.9, ClassificationSource::Local));

        let fired: Vec<ChannelKind> = log.lock().unwrap().iter().map(|(kind, _)| *kind).collect();
        assert_eq!(fired, vec![ChannelKind::Visual, ChannelKind::Haptic, ChannelKind::Audible]);
        assert!(log.lock().unwrap().iter().all(|(_, s)| *s == Severity::Critical));
        assert_eq!(dispatcher.history().recent(1), vec![alert]);
    }

    #[test]
    fn test_mirror_failure_does_not_lose_alert() {
        let (dispatcher, _) = dispatcher(10, None);
        let dispatcher = dispatcher.with_mirror(Box::new(BrokenMirror));

        dispatcher.dispatch(&classification("scream", 0.6, ClassificationSource::Local));
        assert_eq!(dispatcher.history().len(), 1);
    }

    #[test]
    fn test_location_override() {
        let (dispatcher, _) = dispatcher(10, None);
        let fire = classification("fire_alarm", 0.95, ClassificationSource::Local);

        let kitchen = dispatcher.dispatch_with_location(&fire, Some("Kitchen"));
        assert_eq!(kitchen.location, "Kitchen");
        assert_eq!(kitchen.severity, Severity::Critical);

        let blank = dispatcher.dispatch_with_location(&fire, Some("  "));
        assert_eq!(blank.location, "Whole House");
    }

    #[test]
    fn test_sequencer_continues_after_restore() {
        let (dispatcher, _) = dispatcher(10, None);
        let dispatcher = dispatcher.with_sequencer(AlertSequencer::starting_after(41, None));

        let alert = dispatcher.dispatch(&classification("doorbell", 0.8, ClassificationSource::Local));
        assert_eq!(alert.id, 42);
    }

    #[test]
    fn test_concurrent_dispatch_is_serialized() {
        let (dispatcher, _) = dispatcher(100, None);
        let dispatcher = Arc::new(dispatcher);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        dispatcher.dispatch(&classification("phone_ring", 0.8, ClassificationSource::Local));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let recent = dispatcher.history().recent(100);
        assert_eq!(recent.len(), 40);
        assert!(recent.windows(2).all(|w| w[0].id > w[1].id && w[0].created_at >= w[1].created_at));
    }
}
