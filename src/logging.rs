//! Tracing setup (ambient stack, SPEC_FULL.md "Logging").
//!
//! Grounded on the teacher's `plugins::logging::init()`: an `EnvFilter`
//! from `RUST_LOG` (default `info`), `log::` call sites forwarded into the
//! tracing pipeline via `tracing_log::LogTracer`. Unlike the teacher's
//! desktop app, this is a short-lived CLI process with no rolling daily log
//! directory to manage — output goes to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber. Safe to call once at process
/// start; a second call is a no-op (errors from `try_init` are swallowed).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .ok();

    tracing_log::LogTracer::init().ok();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sigap started");
}
