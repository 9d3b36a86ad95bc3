//! Security tests for identifier validation and path containment.
//!
//! Every filesystem path Warden builds from plugin-declared data passes
//! through these two guards, so the suites here try to break them:
//! - traversal through identifiers
//! - escapes through resolved paths
//! - lookalike prefixes and symlink-free lexical tricks

mod containment;
mod path_traversal;
