//! # Structured Logging Module
//!
//! Tracing initialization for processes embedding the messaging layer.
//! Initialization is guarded so repeated calls (or a subscriber already
//! installed by the host process) are harmless.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with an `EnvFilter`.
///
/// `COURIER_LOG` wins over the supplied default level, mirroring how the
/// rest of the configuration surface treats environment overrides.
pub fn init_logging(default_level: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env("COURIER_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(filter),
        );

        // The host process may have installed its own subscriber already.
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized, keeping it");
        }
    });
}
