//! Warden CLI library.
//!
//! Exposes argument parsing, command implementations and output formatters
//! so they can be tested without spawning the `warden` binary.

pub mod actions;
pub mod cli;
pub mod commands;
pub mod formatters;
pub mod runner;

pub use actions::TokenAction;
pub use cli::{Cli, Commands, LogFormat};
