//! Tracing setup for session-check.
//!
//! `RUST_LOG` controls the filter (default `warn`, so snapshot output stays
//! readable). `SESSION_CHECK_DEBUG_LOG=1` forces `debug` for everything.

use std::env;

use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "SESSION_CHECK_DEBUG_LOG";

pub fn init() {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
