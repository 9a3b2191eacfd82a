//! Subcommand implementations.

pub mod cleanup;
pub mod fetch;
pub mod generate;
pub mod serve;
