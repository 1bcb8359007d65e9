//! Tracing subscriber setup shared by binaries and test harnesses.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, stage completions |
//! | DEBUG | Decision points, intermediate values |
//! | TRACE | Per-item iteration (segments, hits) |

/// Initialize a global tracing subscriber.
///
/// Respects `RUST_LOG`; falls back to `info`. Safe to call more than once;
/// subsequent calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
