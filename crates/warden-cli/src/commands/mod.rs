//! Command implementations for the `warden` CLI.
//!
//! Each command performs its operation, prints the result in the requested
//! format and returns an exit code. Errors propagate to the runner, which
//! maps them to exit codes.

pub mod discover;
pub mod exec;
pub mod load;
pub mod token;
