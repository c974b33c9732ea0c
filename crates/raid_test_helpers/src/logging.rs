//! Test logging configuration utilities
//!
//! Configures tracing for tests to prevent output pollution and enable
//! debugging when needed.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static INIT: Once = Once::new();

/// Initialize tracing for tests with a custom log level.
///
/// This function can only take effect once per test process due to
/// global subscriber limitations. Subsequent calls are ignored.
pub fn init_test_logging(level: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Suppress all but error logs for clean test output
pub fn suppress_logs() {
    init_test_logging("error");
}
