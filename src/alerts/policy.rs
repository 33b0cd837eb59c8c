// Alert policy
// Static label -> (category, severity, default location) lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::classifier::types::SoundLabel;

/// Location used when nothing better is known
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Broad kind of alert, drives how the user is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Emergency,
    Doorbell,
    Phone,
    Baby,
    Car,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Emergency => "emergency",
            Category::Doorbell => "doorbell",
            Category::Phone => "phone",
            Category::Baby => "baby",
            Category::Car => "car",
            Category::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "emergency" => Some(Category::Emergency),
            "doorbell" => Some(Category::Doorbell),
            "phone" => Some(Category::Phone),
            "baby" => Some(Category::Baby),
            "car" => Some(Category::Car),
            "unknown" => Some(Category::Unknown),
            _ => None,
        }
    }

    /// Text shown to the user
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Emergency => "Emergency",
            Category::Doorbell => "Doorbell",
            Category::Phone => "Phone Call",
            Category::Baby => "Baby Crying",
            Category::Car => "Car Horn",
            Category::Unknown => "Unknown Sound",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert urgency, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an alert for a given label looks like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub category: Category,
    pub severity: Severity,
    pub default_location: String,
}

impl PolicyEntry {
    pub fn new(category: Category, severity: Severity, default_location: impl Into<String>) -> Self {
        PolicyEntry {
            category,
            severity,
            default_location: default_location.into(),
        }
    }

    /// Entry applied to labels the table does not know
    pub fn unknown() -> Self {
        PolicyEntry::new(Category::Unknown, Severity::Medium, UNKNOWN_LOCATION)
    }
}

/// Read-only label lookup. Lookups never fail.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: HashMap<SoundLabel, PolicyEntry>,
}

impl PolicyTable {
    pub fn empty() -> Self {
        PolicyTable {
            entries: HashMap::new(),
        }
    }

    /// The household table
    pub fn standard() -> Self {
        use Category::*;
        use Severity::*;

        PolicyTable::empty()
            .with_entry(SoundLabel::FireAlarm, PolicyEntry::new(Emergency, Critical, "Whole House"))
            .with_entry(SoundLabel::SmokeDetector, PolicyEntry::new(Emergency, Critical, "Whole House"))
            .with_entry(SoundLabel::Doorbell, PolicyEntry::new(Doorbell, Medium, "Front Door"))
            .with_entry(SoundLabel::PhoneRing, PolicyEntry::new(Phone, High, "Living Room"))
            .with_entry(SoundLabel::BabyCry, PolicyEntry::new(Baby, High, "Nursery"))
            .with_entry(SoundLabel::CarHorn, PolicyEntry::new(Car, Medium, "Outside"))
            .with_entry(SoundLabel::GlassBreak, PolicyEntry::new(Emergency, Critical, UNKNOWN_LOCATION))
            .with_entry(SoundLabel::Scream, PolicyEntry::new(Emergency, Critical, UNKNOWN_LOCATION))
    }

    pub fn with_entry(mut self, label: SoundLabel, entry: PolicyEntry) -> Self {
        self.entries.insert(label, entry);
        self
    }

    pub fn get(&self, label: &SoundLabel) -> Option<&PolicyEntry> {
        self.entries.get(label)
    }

    /// Entry for `label`, or the unknown entry
    pub fn lookup(&self, label: &SoundLabel) -> PolicyEntry {
        match self.entries.get(label) {
            Some(entry) => entry.clone(),
            None => {
                log::debug!("No policy for label '{}', using default", label);
                PolicyEntry::unknown()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}
