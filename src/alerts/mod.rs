// Alert module
// Policy lookup, alert records, notification channels, bounded history, dispatch

pub mod alert;
pub mod channels;
pub mod dispatcher;
pub mod history;
pub mod policy;

pub use alert::{Alert, AlertSequencer};
pub use channels::{
    AudibleTone, ChannelError, ChannelKind, HapticPattern, IntensityTable, LoggedMotor, NotificationChannel,
    RodioTonePlayer, TerminalFlash, VisualFlash,
};
pub use dispatcher::AlertDispatcher;
pub use history::{HistoryMirror, HistoryStore};
pub use policy::{Category, PolicyEntry, PolicyTable, Severity};
