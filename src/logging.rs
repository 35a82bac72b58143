//! Tracing subscriber setup for the binary.
//!
//! Library code only emits events; this is the one place a subscriber is
//! installed. Log lines go to stderr so command output on stdout stays
//! clean for piping.

use std::str::FromStr;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when the requested level does not parse.
pub const DEFAULT_LEVEL: &str = "info";

/// Build the filter for `log_level`.
///
/// A bare level (`debug`) applies to this crate only; directive strings with
/// `,` or `=` are taken as they are.
pub fn filter_spec(log_level: &str) -> String {
    let normalized = log_level.trim();
    if normalized.is_empty() {
        return DEFAULT_LEVEL.to_string();
    }
    if normalized.contains(',') || normalized.contains('=') {
        normalized.to_string()
    } else {
        format!("warn,stratforge={normalized}")
    }
}

pub fn init(log_level: &str, json_format: bool) -> Result<(), TryInitError> {
    let spec = filter_spec(log_level);
    let filter = EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_current_span(false);
        subscriber.with(json_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact();
        subscriber.with(fmt_layer).try_init()?;
    }

    tracing::debug!(
        filter = %spec,
        format = if json_format { "json" } else { "compact" },
        "logging initialized"
    );
    Ok(())
}
