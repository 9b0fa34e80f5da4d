//! `journeyflow` - Guest fulfillment journey workflow engine
//!
//! This library tracks hotel guests through a fixed five-stage lifecycle
//! (awareness, evaluation, booking, experience, feedback). Each journey is
//! a state machine running in its own actor, with score guards, timeouts,
//! stalled-journey recovery, pattern and anomaly analysis, and
//! notification hooks for persistence and audit collaborators.

pub mod cli;
pub mod config;
pub mod error;
pub mod journey;
pub mod observability;
