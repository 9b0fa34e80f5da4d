//! Logging initialization for `journeyflow`.
//!
//! Structured logging via `tracing`, rendered for humans or as JSON on
//! stderr. Verbosity applies to the engine's own targets only; dependencies
//! stay at `warn` so `-vv` shows journey transitions and dispatch decisions
//! without runtime noise. `JOURNEYFLOW_LOG_LEVEL` overrides everything.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_LEVEL_ENV: &str = "JOURNEYFLOW_LOG_LEVEL";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON, one object per line, for log shippers.
    Json,
}

/// Maps a verbosity level to a tracing level name.
///
/// - 0 → `"warn"`
/// - 1 → `"info"` (transitions, timeouts, config warnings)
/// - 2 → `"debug"` (every dispatch, stale deadlines, sink writes)
/// - 3+ → `"trace"` (saturates)
#[must_use]
pub const fn verbosity_to_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Builds the default filter directive.
///
/// Quiet mode keeps errors only. Otherwise dependencies log at `warn` and
/// the `journeyflow` targets at the requested verbosity.
#[must_use]
pub fn default_directive(verbosity: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbosity_to_level(verbosity) {
        "warn" => "warn".to_string(),
        level => format!("warn,journeyflow={level}"),
    }
}

/// Initializes the global tracing subscriber.
///
/// If `JOURNEYFLOW_LOG_LEVEL` is set it takes precedence over `verbosity`
/// and `quiet`. Uses `try_init()` so calling this more than once (e.g. in
/// tests) is safe.
pub fn init_logging(format: LogFormat, verbosity: u8, quiet: bool, color: ColorChoice) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity, quiet)));

    // module paths only help once per-dispatch debug lines show up
    let show_target = verbosity >= 2;

    let use_ansi = match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    match format {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(use_ansi)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .flatten_event(true)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_default_is_human() {
        assert_eq!(LogFormat::default(), LogFormat::Human);
    }

    #[test]
    fn init_logging_does_not_panic() {
        init_logging(LogFormat::Human, 0, false, ColorChoice::Auto);
        init_logging(LogFormat::Json, 3, true, ColorChoice::Never);
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(verbosity_to_level(0), "warn");
        assert_eq!(verbosity_to_level(1), "info");
        assert_eq!(verbosity_to_level(2), "debug");
        assert_eq!(verbosity_to_level(3), "trace");
        assert_eq!(verbosity_to_level(255), "trace");
    }

    #[test]
    fn verbosity_is_scoped_to_engine_targets() {
        assert_eq!(default_directive(0, false), "warn");
        assert_eq!(default_directive(1, false), "warn,journeyflow=info");
        assert_eq!(default_directive(2, false), "warn,journeyflow=debug");
        assert!(EnvFilter::try_new(default_directive(3, false)).is_ok());
    }

    #[test]
    fn quiet_keeps_errors_only() {
        assert_eq!(default_directive(0, true), "error");
        assert_eq!(default_directive(3, true), "error");
    }
}
