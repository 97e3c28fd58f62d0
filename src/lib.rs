//! Two small load tools for the trade blotter: a streaming subscriber that
//! fans out long-lived HTTP connections, and an ingester that bulk-loads
//! synthetic trades into the search index.

pub mod bulk;
pub mod config;
pub mod ingest;
pub mod stream;
pub mod trade;

pub use crate::config::Config;

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over the
/// configured level when it is set.
pub fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
