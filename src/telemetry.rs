//! Structured logging setup
//!
//! Every gateway component logs through `tracing` with structured fields
//! (`provider`, `model`, `position`, `request_id`, ...). This module installs
//! the process-wide subscriber.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Filter used when `RUST_LOG` is unset
///
/// The configured level applies to the gateway itself; HTTP access logs from
/// `tower_http` stay at debug. An unrecognized level falls back to info.
fn default_directive(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    let level = if LEVELS.contains(&level.as_str()) {
        level.as_str()
    } else {
        "info"
    };
    format!("tailgate={},tower_http=debug", level)
}

/// Install the fmt subscriber once per process; later calls are no-ops
///
/// `RUST_LOG` takes precedence over `[observability] log_level`.
///
/// ```no_run
/// tailgate::telemetry::init("info");
/// tracing::info!(chain_len = 3, "Gateway started");
/// ```
pub fn init(level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
