//! Configuration module
//!
//! Loads and validates engine policy: state timeouts, guard thresholds,
//! anomaly thresholds and supervisor scan settings.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
