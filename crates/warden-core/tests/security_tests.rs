//! Entry point for the security test suites.

mod security;
