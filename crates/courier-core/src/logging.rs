//! Structured logging setup (`tracing` + `tracing-subscriber`).
//!
//! The core only emits `tracing` records; installing a subscriber is left to
//! the binary. `init_logging` is safe to call more than once.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output shape of the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. `"info"` or
/// `"courier_core=debug,info"`) is used.
pub fn init_logging(format: LogFormat, default_level: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let registry = tracing_subscriber::registry().with(filter);
        let result = match format {
            LogFormat::Text => registry
                .with(fmt::layer().with_target(true).with_thread_ids(true))
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_target(true).with_current_span(false))
                .try_init(),
        };

        // 既に別の subscriber が入っている（テストハーネスなど）のはエラーではない
        if result.is_err() {
            tracing::debug!("global tracing subscriber already installed, keeping it");
        }
    });
}
