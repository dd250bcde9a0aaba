//! Logging setup for leanrow.
//!
//! leanrow emits structured events through `tracing`. Nothing is printed
//! unless a subscriber is installed, either by the application or by
//! [`init`] when the `tracing-subscriber` feature is enabled.
//!
//! # Environment Variables
//!
//! - `LEANROW_DEBUG=true|1|yes` - Enable debug logging
//! - `LEANROW_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `LEANROW_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! # Usage
//!
//! ```rust,no_run
//! use leanrow_query::logging;
//!
//! // Once, at startup.
//! logging::init();
//! ```
//!
//! Events emitted by the engine:
//!
//! | Target | Level | Fields |
//! |---|---|---|
//! | statement dispatch | `debug` | `sql`, `params` |
//! | association planning | `debug` | `association`, `kind`, `keys` |
//! | skipped lookup | `trace` | `association`, `reason` |
//! | merge | `trace` | `parents`, `children`, `matched` |

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "LEANROW_DEBUG";
const LEVEL_VAR: &str = "LEANROW_LOG_LEVEL";
const FORMAT_VAR: &str = "LEANROW_LOG_FORMAT";

/// Check if debug logging is enabled via `LEANROW_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

/// The configured log level.
///
/// `LEANROW_LOG_LEVEL` wins when it names a valid level; otherwise the level
/// is "debug" when `LEANROW_DEBUG` is on and "warn" when it is not.
pub fn get_log_level() -> &'static str {
    resolve_level(env::var(LEVEL_VAR).ok().as_deref(), is_debug_enabled())
}

/// The configured output format, "json" unless `LEANROW_LOG_FORMAT` says otherwise.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var(FORMAT_VAR).ok().as_deref())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn resolve_level(requested: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };
    match requested.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

fn resolve_format(requested: Option<&str>) -> &'static str {
    match requested.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

/// Initialize the leanrow logging system.
///
/// Subsequent calls are no-ops. Does nothing unless `LEANROW_DEBUG` or
/// `LEANROW_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "leanrow={},leanrow_query={},leanrow_sqlite={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            // try_init: the application may already own the global subscriber.
            let installed = match get_log_format() {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "leanrow logging initialized"
                );
            }
        }
    });
}

/// Initialize logging with a specific level.
///
/// # Safety
///
/// This function modifies environment variables, which is unsafe in
/// multi-threaded programs. Call it at startup before spawning threads.
pub fn init_with_level(level: &str) {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var(LEVEL_VAR, level);
    }
    init();
}

/// Initialize debug logging. Equivalent to `LEANROW_DEBUG=true` plus [`init`].
///
/// # Safety
///
/// Same caveat as [`init_with_level`].
pub fn init_debug() {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var(DEBUG_VAR, "true");
    }
    init();
}
