//! CLI argument definitions
//!
//! All Clap derive structs for `journeyflow` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Guest fulfillment journey workflow engine.
#[derive(Parser, Debug)]
#[command(name = "journeyflow", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "JOURNEYFLOW_COLOR")]
    pub color: ColorChoice,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "JOURNEYFLOW_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSONL command stream through the engine and print a report.
    Replay(ReplayArgs),

    /// Validate an engine configuration file.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Arguments for `replay`.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSONL file with one inbound command per line.
    #[arg(long)]
    pub commands: PathBuf,

    /// Path to YAML engine configuration.
    #[arg(short, long, env = "JOURNEYFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Append a JSONL journal of processed events and snapshots here.
    #[arg(long, env = "JOURNEYFLOW_JOURNAL")]
    pub journal: Option<PathBuf>,

    /// Expose Prometheus metrics on this port while replaying.
    #[arg(long, env = "JOURNEYFLOW_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration file to validate.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_with_commands() {
        let cli = Cli::try_parse_from(["journeyflow", "replay", "--commands", "events.jsonl"]);
        assert!(cli.is_ok(), "Failed to parse: {cli:?}");
    }

    #[test]
    fn test_replay_requires_commands() {
        let cli = Cli::try_parse_from(["journeyflow", "replay"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_validate_requires_config() {
        let cli = Cli::try_parse_from(["journeyflow", "validate"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from(["journeyflow", "validate", "--config", "engine.yaml"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_help_output() {
        let result = Cli::try_parse_from(["journeyflow", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_output() {
        let result = Cli::try_parse_from(["journeyflow", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "journeyflow",
            "-vv",
            "--log-format",
            "json",
            "version",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);
        if let Commands::Version(args) = cli.command {
            assert_eq!(args.format, OutputFormat::Json);
            return;
        }
        panic!("Expected VersionArgs");
    }

    #[test]
    fn test_default_color() {
        let cli = Cli::try_parse_from(["journeyflow", "version"]).unwrap();
        assert_eq!(cli.color, ColorChoice::Auto);
        assert!(!cli.quiet);
    }
}
