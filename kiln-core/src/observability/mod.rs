//! Observability infrastructure: tracing and metrics.
//!
//! kiln only records metrics. Exporting them is up to the embedding process,
//! which can install any `metrics` recorder before calling into kiln.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Initialize logging to stderr.
///
/// `RUST_LOG` takes precedence over `level`. Calling this twice is harmless:
/// the second subscriber is not installed.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .try_init()
        .is_ok();

    metrics::register_core_metrics();

    if installed {
        tracing::debug!("Observability initialized (level: {})", level);
    }
}
