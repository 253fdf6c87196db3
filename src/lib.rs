pub mod config;
pub mod crypto;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod service;
pub mod store;

pub use service::{IntakeError, IntakeService, IntakeSnapshot};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}
