//! `validate` command handler
//!
//! Loads an engine configuration file and reports problems without
//! starting anything.

use serde_json::json;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::ConfigLoader;
use crate::error::{ConfigError, JourneyflowError};

/// Validate a configuration file.
///
/// # Errors
///
/// Returns a configuration error if the file is missing, unparsable, or
/// fails validation. Each validation issue is printed before returning.
pub fn run(args: &ValidateArgs) -> Result<(), JourneyflowError> {
    tracing::info!(file = %args.config.display(), "validating configuration");

    let load_result = match ConfigLoader::default().load(&args.config) {
        Ok(result) => result,
        Err(e) => {
            if let ConfigError::ValidationError { errors, .. } = &e {
                for issue in errors {
                    eprintln!("  {issue}");
                }
            }
            return Err(e.into());
        }
    };

    match args.format {
        OutputFormat::Human => {
            for warning in &load_result.warnings {
                eprintln!(
                    "warning: {} at {}",
                    warning.message,
                    warning.location.as_deref().unwrap_or("<unknown>")
                );
            }
            println!("{}: configuration valid", args.config.display());
        }
        OutputFormat::Json => {
            let warnings: Vec<_> = load_result
                .warnings
                .iter()
                .map(|w| json!({ "message": w.message, "location": w.location }))
                .collect();
            let report = json!({
                "file": args.config.display().to_string(),
                "valid": true,
                "warnings": warnings,
                "config": load_result.config.as_ref(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
