//! Configuration loader
//!
//! This module implements the configuration loading pipeline:
//! 1. Size check and read
//! 2. YAML parsing
//! 3. Deserialization to typed config
//! 4. `JOURNEYFLOW_*` environment overrides
//! 5. Validation
//! 6. Freeze with `Arc`

use crate::config::schema::EngineConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

use std::path::Path;
use std::sync::Arc;

/// Environment variable overriding `guards.awareness_min_score`.
pub const ENV_AWARENESS_MIN_SCORE: &str = "JOURNEYFLOW_AWARENESS_MIN_SCORE";

/// Environment variable overriding `guards.evaluation_min_score`.
pub const ENV_EVALUATION_MIN_SCORE: &str = "JOURNEYFLOW_EVALUATION_MIN_SCORE";

// ============================================================================
// Public API
// ============================================================================

/// Limits for configuration size to prevent resource exhaustion.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum configuration file size in bytes.
    pub max_config_size: u64,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_config_size: env_or("JOURNEYFLOW_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<EngineConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    limits: ConfigLimits,
}

impl ConfigLoader {
    /// Creates a new configuration loader with the given limits.
    #[must_use]
    pub const fn new(limits: ConfigLimits) -> Self {
        Self { limits }
    }

    /// Loads a configuration file and returns the frozen configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - YAML parsing fails
    /// - An environment override is not a number
    /// - Validation fails
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        if metadata.len() > self.limits.max_config_size {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.limits.max_config_size,
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw, path, |name| std::env::var(name).ok())
    }

    /// Loads configuration from YAML text.
    ///
    /// `env` resolves override variables; pass `|_| None` to ignore the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing, an override, or validation fails.
    pub fn load_str<F>(&self, raw: &str, path: &Path, env: F) -> Result<LoadResult, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut config: EngineConfig = if raw.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };

        let mut warnings = apply_env_overrides(&mut config, env)?;

        let result = Validator::new().validate(&config);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: path.display().to_string(),
                errors: result.errors,
            });
        }

        warnings.extend(result.warnings.into_iter().map(|w| LoadWarning {
            message: w.message,
            location: Some(w.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Overrides
// ============================================================================

fn apply_env_overrides<F>(config: &mut EngineConfig, env: F) -> Result<Vec<LoadWarning>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut warnings = Vec::new();

    let targets: [(&str, &mut f64); 2] = [
        (ENV_AWARENESS_MIN_SCORE, &mut config.guards.awareness_min_score),
        (ENV_EVALUATION_MIN_SCORE, &mut config.guards.evaluation_min_score),
    ];

    for (name, slot) in targets {
        let Some(raw) = env(name) else { continue };
        let value: f64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: name.to_string(),
            value: raw.clone(),
            expected: "a number between 0 and 100".to_string(),
        })?;
        *slot = value;
        warnings.push(LoadWarning {
            message: format!("overridden from environment ({value})"),
            location: Some(name.to_string()),
        });
    }

    Ok(warnings)
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
