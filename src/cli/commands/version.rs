//! Version information display
//!
//! Prints version metadata in human or JSON format.

use crate::cli::args::{OutputFormat, VersionArgs};
use crate::journey::SNAPSHOT_FORMAT_VERSION;

/// Print version information.
pub fn run(args: &VersionArgs) {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");

    match args.format {
        OutputFormat::Human => {
            println!("{name} {version} (snapshot format {SNAPSHOT_FORMAT_VERSION})");
        }
        OutputFormat::Json => {
            println!(
                r#"{{"name":"{name}","version":"{version}","snapshot_format":{SNAPSHOT_FORMAT_VERSION}}}"#
            );
        }
    }
}
