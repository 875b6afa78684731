//! Structured logging setup using tracing.
//!
//! JSON output by default for log aggregation; a human-readable format is
//! available for local runs via `logging.format: pretty`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the tracing subscriber.
///
/// The `RUST_LOG` environment variable takes precedence over the
/// configured level.
///
/// # Panics
///
/// Panics if the subscriber has already been initialized.
pub fn init_logging(config: &LoggingConfig) {
    let filter_layer = match EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("FATAL: Failed to create log filter: {e}");
            std::process::exit(1);
        }
    };

    if config.format == "pretty" {
        let fmt_layer = fmt::layer().with_target(true);
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .flatten_event(true);
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter_layer)
            .init();
    }

    tracing::info!(level = %config.level, format = %config.format, "Logging initialized");
}
