//! Configuration validation
//!
//! Semantic checks on a deserialized [`EngineConfig`]. Validation collects
//! every issue rather than stopping at the first one.

use std::time::Duration;

use crate::config::schema::{AnalysisConfig, EngineConfig, GuardConfig, TimeoutConfig};
use crate::error::{Severity, ValidationIssue};
use crate::journey::scoring::{MAX_SCORE, MIN_SCORE};

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns the result.
    pub fn validate(&mut self, config: &EngineConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_timeouts(&config.timeouts);
        self.validate_guards(&config.guards);
        self.validate_analysis(&config.analysis);

        if config.supervisor.stall_threshold_minutes == 0 {
            self.add_warning(
                "supervisor.stall_threshold_minutes",
                "threshold of 0 reports every live journey as stalled",
            );
        }

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    fn validate_timeouts(&mut self, timeouts: &TimeoutConfig) {
        let entries = [
            ("timeouts.awareness", timeouts.awareness),
            ("timeouts.evaluation", timeouts.evaluation),
            ("timeouts.booking", timeouts.booking),
            ("timeouts.feedback", timeouts.feedback),
            ("timeouts.stalled", timeouts.stalled),
        ];
        for (path, value) in entries {
            if value.is_zero() {
                self.add_error(path, "timeout must be non-zero");
            }
        }

        if timeouts.booking > Duration::from_secs(24 * 60 * 60) {
            self.add_warning(
                "timeouts.booking",
                "booking window longer than a day rarely matches a payment hold",
            );
        }
    }

    fn validate_guards(&mut self, guards: &GuardConfig) {
        for (path, value) in [
            ("guards.awareness_min_score", guards.awareness_min_score),
            ("guards.evaluation_min_score", guards.evaluation_min_score),
        ] {
            if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
                self.add_error(path, "threshold must be within 0..=100");
            } else if value <= MIN_SCORE {
                self.add_warning(path, "threshold of 0 disables the guard");
            }
        }
    }

    fn validate_analysis(&mut self, analysis: &AnalysisConfig) {
        if analysis.high_frequency_high < analysis.high_frequency_medium {
            self.add_error(
                "analysis.high_frequency_high",
                "must be greater than or equal to analysis.high_frequency_medium",
            );
        }

        if !(0.0..=1.0).contains(&analysis.negative_ratio_limit) {
            self.add_error("analysis.negative_ratio_limit", "ratio must be within 0..=1");
        }

        if analysis.negative_impact_below >= 0 {
            self.add_warning(
                "analysis.negative_impact_below",
                "non-negative cut-off counts neutral events as negative",
            );
        }

        if analysis.silence_gap.is_zero() {
            self.add_error("analysis.silence_gap", "gap must be non-zero");
        }

        if analysis.recent_activity_window.is_zero() {
            self.add_error("analysis.recent_activity_window", "window must be non-zero");
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}
