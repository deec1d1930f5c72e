//! Command line front end for the audience segment engine.
//!
//! Loads segment definitions and tracked events from files and answers
//! membership questions against them.

pub mod commands;
pub mod config;
pub mod sources;
pub mod tracing_setup;

pub use commands::{Cli, Command};
pub use config::AudienceConfig;
