// Listening pipeline module
// Capture -> classify -> dispatch sessions, their state machine and tracing

pub mod listener;
pub mod state;
pub mod trace;

pub use listener::{Listener, ListenerError, ListenerSettings};
pub use state::{transition, ListenerEvent, ListenerState};
pub use trace::{read_trace_file, TraceEntry, TraceError, TraceStage, TraceWriter};
