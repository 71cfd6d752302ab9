//! Subcommand handlers.

pub mod config;
pub mod demo;
pub mod grants;
