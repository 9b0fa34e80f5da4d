//! Command-line interface
//!
//! Argument definitions and the command handlers they dispatch to.

pub mod args;
pub mod commands;
