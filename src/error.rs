//! Error types for `journeyflow`
//!
//! This module provides the error hierarchy for the journey engine, the
//! configuration layer and the persistence collaborator boundary, plus the
//! exit codes used by the CLI.

use std::path::PathBuf;
use thiserror::Error;

use crate::journey::JourneyState;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `journeyflow` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Journey engine error (rejected event, unknown journey)
    pub const JOURNEY_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `journeyflow` operations.
///
/// Aggregates all domain-specific errors and provides a unified
/// interface for exit code mapping.
#[derive(Debug, Error)]
pub enum JourneyflowError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Journey engine error
    #[error(transparent)]
    Journey(#[from] JourneyError),

    /// Persistence collaborator error
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl JourneyflowError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Journey(_) => ExitCode::JOURNEY_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
            Self::Sink(_) | Self::Json(_) => ExitCode::ERROR,
        }
    }
}

// ============================================================================
// Journey Engine Errors
// ============================================================================

/// Journey engine errors.
///
/// A guard that fails (for example an advance attempted with an
/// insufficient stage score) is not represented here: it is an accepted
/// command that produced no transition, reported through
/// [`DispatchOutcome`](crate::journey::DispatchOutcome).
#[derive(Debug, Error)]
pub enum JourneyError {
    /// Malformed event: missing identifiers, unknown type, impact out of range.
    /// Rejected before it reaches the event log.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Event addressed to a journey that is already in a terminal state.
    #[error("journey {journey_id} is inactive (state: {state})")]
    JourneyInactive {
        /// Journey the event was addressed to
        journey_id: String,
        /// Terminal state the journey is in
        state: JourneyState,
    },

    /// Stage lookup by an unrecognised code.
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    /// No live or paused journey with this id.
    #[error("journey not found: {0}")]
    NotFound(String),

    /// A journey with this id is already registered.
    #[error("journey already exists: {0}")]
    AlreadyExists(String),

    /// The journey's actor task has stopped and can no longer answer.
    #[error("journey actor unavailable: {0}")]
    ActorUnavailable(String),

    /// Snapshot could not be encoded or rehydrated.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl JourneyError {
    /// Returns a stable label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "invalid_event",
            Self::JourneyInactive { .. } => "journey_inactive",
            Self::UnknownStage(_) => "unknown_stage",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::ActorUnavailable(_) => "actor_unavailable",
            Self::Snapshot(_) => "snapshot",
        }
    }
}

/// Errors raised while encoding or rehydrating a journey snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot format version mismatch.
    #[error("snapshot version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this build understands
        expected: u32,
        /// Version found in the snapshot
        actual: u32,
    },
}

// ============================================================================
// Persistence Collaborator Errors
// ============================================================================

/// Failure reported by a snapshot sink.
///
/// The engine logs these and moves on; retrying is the sink's concern.
#[derive(Debug, Error)]
pub enum SinkError {
    /// I/O error while writing
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be serialized
    #[error("sink JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backing store refused the write (e.g. stale version)
    #[error("write rejected: {0}")]
    Rejected(String),
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Configuration file exceeds the size limit
    #[error("configuration file {path} is {size} bytes (limit: {limit})")]
    TooLarge {
        /// Path to the configuration file
        path: PathBuf,
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "timeouts.booking")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `journeyflow` operations.
pub type Result<T> = std::result::Result<T, JourneyflowError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::JOURNEY_ERROR, 5);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_journey_error_exit_code() {
        let err: JourneyflowError = JourneyError::InvalidEvent("test".to_string()).into();
        assert_eq!(err.exit_code(), ExitCode::JOURNEY_ERROR);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: JourneyflowError = ConfigError::MissingFile {
            path: PathBuf::from("/test"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_io_error_exit_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: JourneyflowError = io_err.into();
        assert_eq!(err.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn test_journey_inactive_display() {
        let err = JourneyError::JourneyInactive {
            journey_id: "j-1".to_string(),
            state: JourneyState::Expired,
        };
        let msg = err.to_string();
        assert!(msg.contains("j-1"));
        assert!(msg.contains("expired"));
    }

    #[test]
    fn test_snapshot_error_converts() {
        let err: JourneyError = SnapshotError::VersionMismatch {
            expected: 1,
            actual: 9,
        }
        .into();
        assert!(err.to_string().contains("expected 1, got 9"));
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "timeouts.booking".to_string(),
            message: "timeout must be non-zero".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: timeout must be non-zero at timeouts.booking"
        );
    }

    #[test]
    fn test_validation_issue_warning_display() {
        let issue = ValidationIssue {
            path: "guards.awareness_min_score".to_string(),
            message: "threshold of 0 disables the guard".to_string(),
            severity: Severity::Warning,
        };
        assert_eq!(
            issue.to_string(),
            "warning: threshold of 0 disables the guard at guards.awareness_min_score"
        );
    }
}
