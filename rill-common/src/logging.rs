//! Logging setup for rill binaries
//!
//! Libraries only emit `tracing` events; installing a subscriber is left to
//! the binary so embedding applications keep control of their output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to the rill
/// crates only.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("rill_ap={level},rill_common={level}", level = default_level).into()
    });

    // A second init (tests, embedding) is harmless, so the error is ignored
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
