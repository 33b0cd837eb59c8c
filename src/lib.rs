// Hearo - Household sound-event alert dispatcher
// Module declarations

pub mod alerts;
pub mod app;
pub mod audio;
pub mod classifier;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod state;

pub use alerts::{Alert, AlertDispatcher, Category, HistoryStore, PolicyTable, Severity};
pub use app::{AppError, AppStatus, HearoApp};
pub use classifier::{Classification, ClassificationSource, SoundLabel};
pub use config::AppConfig;
pub use pipeline::{Listener, ListenerState};
