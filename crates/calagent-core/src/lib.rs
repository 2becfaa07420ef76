pub mod config;
pub mod error;

pub use config::{AuthConfig, CalendarConfig, Config, LoggingConfig, ValidationResult};
pub use error::ConfigError;

/// Initialize tracing/logging.
///
/// `RUST_LOG` wins over `default_filter`. Output goes to stderr so stdout
/// stays reserved for tool results.
pub fn init_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // A second init (e.g. from tests) is a no-op rather than a panic.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!("calagent logging initialized");
}
