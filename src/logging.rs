//! Tracing subscriber setup for the `lore` binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host's job. The CLI calls [`init`] once before loading config. The
//! `RUST_LOG` environment variable overrides the default level.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a stderr `fmt` subscriber. `verbose` raises the default level
/// from `info` to `debug` for this crate.
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "loremaster=debug,info"
    } else {
        "info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    // stderr keeps stdout clean for answers and summaries.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
