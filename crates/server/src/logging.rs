//! # Logging Setup
//!
//! Structured logging for the server binary: JSON by default for log
//! aggregators, plain text with `LOG_FORMAT=text` for local runs. The
//! filter honors `RUST_LOG` and defaults to `info`.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("text") => fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init(),
        _ => fmt().json().with_env_filter(env_filter).init(),
    }
}
