use std::io;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset: the audit consumer logs its
/// batches at `debug`, everything else at `info`.
pub const DEFAULT_FILTER: &str = "info,service::audit=debug";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT=json` selects JSON lines, anything else the compact format.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber writing to stdout. A second call is a no-op.
pub fn init_logging(format: LogFormat) {
    let builder = fmt().with_env_filter(env_filter()).with_writer(io::stdout);
    let _ = match format {
        LogFormat::Compact => builder.with_target(false).compact().try_init(),
        LogFormat::Json => builder.with_target(true).json().try_init(),
    };
}

/// Compact human-readable output.
pub fn init_logging_default() { init_logging(LogFormat::Compact) }

/// JSON lines with targets, for log shippers.
pub fn init_logging_json() { init_logging(LogFormat::Json) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_logging_default();
        init_logging_json();
        tracing::info!(event = "logging_test", "still logging");
    }
}
