//! Tracing subscriber setup.
//!
//! The engine itself only emits `tracing` events; embedding binaries call
//! [`init`] once at startup to get structured JSON logs (bunyan format)
//! filtered by `RUST_LOG`.

use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Installs the global tracing subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset (e.g. `"info"`).
/// Returns an error if a subscriber was already installed, which callers
/// may ignore in tests.
pub fn init(service_name: &str, default_filter: &str) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let formatting_layer = BunyanFormattingLayer::new(service_name.to_string(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    set_global_default(subscriber)
}
