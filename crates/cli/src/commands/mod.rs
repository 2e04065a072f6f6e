//! Subcommand implementations

pub mod analytics;
pub mod health;
