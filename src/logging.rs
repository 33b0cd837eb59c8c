// Logging setup
// env_logger over the log facade; RUST_LOG wins over the configured level

use log::LevelFilter;

/// Parse a level name, falling back to Info
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

/// Install the global logger. Safe to call more than once.
pub fn init_logging(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(parse_level(level));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if builder.try_init().is_err() {
        log::debug!("Logger already initialised");
    }
}
