//! Logging initialization for the CLI.
//!
//! `fnpack-core` reports build progress (`Bundle file for <id>...`), trace
//! warnings and bundler failures as `tracing` events; this module decides
//! where they go. Everything is written to stderr: stdout belongs to command
//! output, which is a single JSON document under `--json`.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose events follow `-v`. Anything else (axum, reqwest, hyper)
/// stays at `warn` unless `RUST_LOG` says otherwise.
const FNPACK_TARGETS: &[&str] = &["fnpack", "fnpack_core"];

/// Level for fnpack's own events: 0 = INFO, 1 = DEBUG, 2+ = TRACE.
fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// `RUST_LOG` (or `warn`) with fnpack's targets raised to `level`.
fn filter_for(base: EnvFilter, level: Level) -> EnvFilter {
    FNPACK_TARGETS.iter().fold(base, |filter, target| {
        filter.add_directive(format!("{target}={level}").parse().unwrap())
    })
}

/// Install the global subscriber.
///
/// With `json`, each event is one JSON line carrying the current span, so a
/// build's events arrive as
///
/// ```json
/// {"timestamp":"...","level":"INFO","fields":{"message":"Bundle file for site..."},"target":"fnpack_core::preset","span":{"preset":"vercel","name":"build"}}
/// ```
///
/// Otherwise events are printed as plain lines without targets.
///
/// # Panics
/// Panics if a global subscriber is already installed.
pub fn init(verbosity: u8, json: bool) {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let filter = filter_for(base, level_for(verbosity));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(false)
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
