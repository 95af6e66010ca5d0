/*!
 * Structured Tracing
 * Subscriber setup and per-cycle spans using the tracing crate
 */

use crate::core::types::Dims;
use tracing::{info, info_span, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Install the global subscriber; returns false if one was already set
///
/// Environment variables:
/// - RUST_LOG: log level (default: info)
/// - MATMUL_TRACE_JSON: JSON output when `1` or `true` (default: false)
///
/// Events go to stderr so stdout carries only prompts and the summary.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("MATMUL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Tracing initialized");
    }
    installed
}

/// Span covering one timed cycle
pub fn span_cycle(cycle: usize, dims: Dims) -> Span {
    info_span!("cycle", cycle, rows = dims.rows, inner = dims.cols)
}
