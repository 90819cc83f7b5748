//! Logging setup.
//!
//! Logs go to stderr so that stdout carries only the run report. `RUST_LOG`
//! overrides the default level, e.g. `RUST_LOG=conformance=debug` to see
//! every dispatched request.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_JSON_VAR: &str = "CONFORMANCE_LOG_JSON";

/// Install the global subscriber. Calling it again is a no-op.
pub fn setup_logging(json: bool, default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        );
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        );
        let _ = subscriber.try_init();
    }
}

/// Whether `CONFORMANCE_LOG_JSON` asks for JSON output.
pub fn should_use_json<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(LOG_JSON_VAR)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
