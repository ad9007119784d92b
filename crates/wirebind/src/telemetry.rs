//! Logging setup shared by the wirebind binaries and tests.
//!
//! The codec emits `log` records and the gRPC layer emits `tracing` events; both
//! end up in one subscriber. The HTTP/2 stack underneath tonic is capped at
//! `warn` unless `RUST_LOG` says otherwise, so per-frame chatter does not bury
//! call-level events.

use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Transport crates that log every frame at `debug`.
const TRANSPORT_DIRECTIVES: &str = "h2=warn,hyper=warn,hyper_util=warn,tower=warn";

/// Initialize tracing with an env-based filter and bridge `log` records.
///
/// Reads `RUST_LOG` for directives (e.g. "debug,wirebind=trace"), falling back to
/// "info". Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_default("info");
}

/// Same as [`init`], with a caller-chosen fallback when `RUST_LOG` is unset.
pub fn init_with_default(directives: &str) {
    let _ = LogTracer::init();

    let fmt_layer = fmt::layer().with_target(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter(directives))
        .with(fmt_layer)
        .try_init();
}

/// Installs a subscriber that discards every event, for benchmark runs.
pub fn init_for_benchmarks() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("off"))
        .try_init();
}

fn filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(directives)))
}

fn default_directives(directives: &str) -> String {
    if directives.trim().is_empty() {
        TRANSPORT_DIRECTIVES.to_string()
    } else {
        format!("{directives},{TRANSPORT_DIRECTIVES}")
    }
}
