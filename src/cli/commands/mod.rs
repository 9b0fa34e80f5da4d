//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod replay;
pub mod validate;
pub mod version;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands};
use crate::error::JourneyflowError;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// `shutdown` is cancelled on the first SIGINT/SIGTERM; long-running
/// commands stop taking new work and finish cleanly.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, shutdown: CancellationToken) -> Result<(), JourneyflowError> {
    match cli.command {
        Commands::Replay(args) => replay::run(&args, &shutdown).await,
        Commands::Validate(args) => validate::run(&args),
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}
