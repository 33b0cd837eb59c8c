// Alert records
// Immutable alert built from a classification plus its policy entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::policy::{Category, Severity};
use crate::classifier::types::{ClassificationSource, SoundLabel};

/// A dispatched notification event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Strictly increasing within a history
    pub id: u64,
    pub label: SoundLabel,
    pub category: Category,
    pub severity: Severity,
    pub location: String,
    pub confidence: f32,
    pub source: ClassificationSource,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// One-line description, e.g. "Doorbell at Front Door (94% confidence, local)"
    pub fn summary(&self) -> String {
        format!(
            "{} at {} ({}% confidence, {})",
            self.category.display_name(),
            self.location,
            (self.confidence * 100.0).round() as u32,
            self.source.as_str()
        )
    }
}

/// Hands out alert ids and creation times
///
/// Ids strictly increase; times never go backwards even if the wall clock does.
#[derive(Debug)]
pub struct AlertSequencer {
    last_id: u64,
    last_at: Option<DateTime<Utc>>,
}

impl AlertSequencer {
    pub fn new() -> Self {
        AlertSequencer {
            last_id: 0,
            last_at: None,
        }
    }

    /// Continue after a previously issued alert
    pub fn starting_after(last_id: u64, last_at: Option<DateTime<Utc>>) -> Self {
        AlertSequencer { last_id, last_at }
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn next(&mut self) -> (u64, DateTime<Utc>) {
        self.next_at(Utc::now())
    }

    fn next_at(&mut self, now: DateTime<Utc>) -> (u64, DateTime<Utc>) {
        self.last_id += 1;
        let at = match self.last_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_at = Some(at);
        (self.last_id, at)
    }
}

impl Default for AlertSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ids_strictly_increase() {
        let mut sequencer = AlertSequencer::new();
        let (a, _) = sequencer.next();
        let (b, _) = sequencer.next();
        let (c, _) = sequencer.next();
        assert!(a < b && b < c);
        assert_eq!(a, 1);
    }

    #[test]
    fn test_clock_going_backwards_is_ignored() {
        let start = Utc::now();
        let mut sequencer = AlertSequencer::starting_after(41, Some(start));

        let (id, at) = sequencer.next_at(start - Duration::seconds(10));
        assert_eq!(id, 42);
        assert_eq!(at, start);

        let later = start + Duration::seconds(1);
        assert_eq!(sequencer.next_at(later), (43, later));
    }

    #[test]
    fn test_summary() {
        let alert = Alert {
            id: 1,
            label: SoundLabel::Doorbell,
            category: Category::Doorbell,
            severity: Severity::Medium,
            location: "Front Door".to_string(),
            confidence: 0.94,
            source: ClassificationSource::Local,
            created_at: Utc::now(),
        };
        assert_eq!(alert.summary(), "Doorbell at Front Door (94% confidence, local)");
    }
}
