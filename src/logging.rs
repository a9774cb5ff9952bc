//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; binaries and tests that want to
//! see them call [`init_logging`] once.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "tabula_core=info";

/// Install a fmt subscriber filtered by `RUST_LOG`. Returns false when a
/// global subscriber was already installed.
pub fn init_logging() -> bool {
    init_with_filter(None)
}

/// Like [`init_logging`] with an explicit filter directive.
pub fn init_with_filter(directive: Option<&str>) -> bool {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()
        .is_ok()
}
