// Sound classification module
// Classifier port, local and remote backends, fallback chain, backend discovery

pub mod backend;
pub mod discovery;
pub mod heuristic;
pub mod remote;
pub mod types;

pub use backend::{ClassifierBackend, ClassifierError, FallbackClassifier, SoundClassifier};
pub use discovery::{discover_backends, BackendProbe, LocalProbe};
pub use heuristic::{LocalClassifier, SoundPrototype};
pub use remote::HttpClassifier;
pub use types::{Classification, ClassificationSource, SoundLabel};
