//! Structured logging setup

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the logging subsystem
///
/// Sets up:
/// - Structured JSON logging to stdout
/// - Environment-based log level filtering (`RUST_LOG` wins over `log_level`)
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(log_level: Option<&str>) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")));

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    tracing_subscriber::registry().with(fmt_layer).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Another test may have installed a subscriber first; only the second call is certain.
        let _ = init_logging(Some("debug"));
        assert!(init_logging(Some("debug")).is_err());
    }
}
