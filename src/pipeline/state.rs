// Listener state machine
// Idle -> Listening -> (per window) Capturing -> Classifying -> Dispatching -> Listening

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Idle,
    Listening,
    Capturing,
    Classifying,
    Dispatching,
    /// Terminal
    Stopped,
}

impl ListenerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerState::Idle => "idle",
            ListenerState::Listening => "listening",
            ListenerState::Capturing => "capturing",
            ListenerState::Classifying => "classifying",
            ListenerState::Dispatching => "dispatching",
            ListenerState::Stopped => "stopped",
        }
    }

    /// True while a session is running
    pub fn is_active(&self) -> bool {
        !matches!(self, ListenerState::Idle | ListenerState::Stopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    Start,
    /// The capture cadence fired
    CaptureTick,
    /// Captured window was below the activity threshold
    WindowSkipped,
    /// Captured window was handed to a classifier
    WindowCaptured,
    ClassificationReady,
    /// Classification failed or fell below the confidence floor
    ClassificationDropped,
    Dispatched,
    Stop,
}

/// Next state. Events that do not apply leave the state unchanged.
///
/// Classification of one window may overlap the capture of the next, so
/// `CaptureTick` is accepted while classifying and dispatching, and
/// `ClassificationReady` while capturing.
pub fn transition(state: ListenerState, event: ListenerEvent) -> ListenerState {
    use ListenerEvent as E;
    use ListenerState as S;

    match (state, event) {
        (S::Stopped, _) => S::Stopped,
        (_, E::Stop) => S::Stopped,

        (S::Idle, E::Start) => S::Listening,

        (S::Listening | S::Classifying | S::Dispatching, E::CaptureTick) => S::Capturing,
        (S::Capturing, E::WindowSkipped) => S::Listening,
        (S::Capturing, E::WindowCaptured) => S::Classifying,

        (S::Classifying | S::Capturing | S::Listening, E::ClassificationReady) => S::Dispatching,
        (S::Classifying | S::Dispatching, E::ClassificationDropped) => S::Listening,
        (S::Dispatching, E::Dispatched) => S::Listening,

        (current, _) => current,
    }
}
