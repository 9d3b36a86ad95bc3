//! BLAKE3 checksums for plugin modules.
//!
//! Checksums are written as `"blake3:<hex>"`. The loader attaches one to every
//! module it loads; the sandbox uses it as its compiled-module cache key, and
//! a manifest may pin the expected value.

use warden_core::{Error, Result};

const PREFIX: &str = "blake3:";

/// Calculates the checksum of `data`.
///
/// # Examples
///
/// ```
/// use warden_loader::checksum::calculate_checksum;
///
/// let checksum = calculate_checksum(b"\0asm");
/// assert!(checksum.starts_with("blake3:"));
/// assert_eq!(checksum.len(), 71);
/// ```
#[must_use]
pub fn calculate_checksum(data: &[u8]) -> String {
    format!("{PREFIX}{}", blake3::hash(data).to_hex())
}

/// Checks `data` against a pinned checksum and returns the actual one.
///
/// The comparison goes through [`blake3::Hash`] equality, which is constant
/// time.
///
/// # Errors
///
/// Returns [`Error::ModuleLoadError`] if `expected` is malformed or does not
/// match.
pub fn verify_checksum(plugin: &str, data: &[u8], expected: &str) -> Result<String> {
    let mismatch = |reason: String| Error::ModuleLoadError {
        plugin: plugin.to_string(),
        reason,
    };

    let expected_hash = expected
        .strip_prefix(PREFIX)
        .and_then(|hex| blake3::Hash::from_hex(hex).ok())
        .ok_or_else(|| mismatch(format!("malformed checksum '{expected}'")))?;

    let actual = blake3::hash(data);
    if actual != expected_hash {
        tracing::warn!(plugin_id = plugin, expected, "Module checksum mismatch");
        return Err(mismatch("module checksum mismatch".to_string()));
    }
    Ok(format!("{PREFIX}{}", actual.to_hex()))
}
