//! Identifier validation and path containment checks.
//!
//! Both checks are pure: they never touch the filesystem. Callers apply
//! [`verify_containment`] to every path derived from plugin-declared data,
//! against the directory that specific path must live under, at every hop.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//! use warden_core::validation::{validate_identifier, verify_containment};
//!
//! assert!(validate_identifier("warden-plugin-github").is_ok());
//! assert!(validate_identifier("@warden/plugin-slack").is_ok());
//! assert!(validate_identifier("../../etc").is_err());
//!
//! let base = Path::new("/srv/plugins/demo");
//! assert!(verify_containment(&base.join("dist/index.wasm"), base).is_ok());
//! assert!(verify_containment(&base.join("../other/index.wasm"), base).is_err());
//! ```

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Longest identifier accepted, matching common package registry limits.
pub const MAX_IDENTIFIER_LEN: usize = 214;

/// Validates a plugin identifier.
///
/// Accepted forms:
/// - `name` where every character is in `[a-z0-9-_]`;
/// - `@scope/name` with exactly one `/` and both segments in `[a-z0-9-_]`.
///
/// Rejected: empty names, backslashes, any `..`, a `/` outside the scoped
/// form, and any other character.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] describing the first violation found.
///
/// # Examples
///
/// ```
/// use warden_core::validation::validate_identifier;
///
/// assert!(validate_identifier("plugin_a-1").is_ok());
/// assert!(validate_identifier("plugins/evil").is_err());
/// assert!(validate_identifier("@scope/a/b").is_err());
/// assert!(validate_identifier("Plugin").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        tracing::warn!(identifier = %name.escape_debug(), reason, "Rejected plugin identifier");
        Err(Error::InvalidIdentifier {
            identifier: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return reject("identifier cannot be empty");
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return reject("identifier is too long");
    }
    if name.contains('\\') {
        return reject("backslashes are not allowed");
    }
    if name.contains("..") {
        return reject("parent directory references are not allowed");
    }

    if let Some(scoped) = name.strip_prefix('@') {
        let mut parts = scoped.split('/');
        let (Some(scope), Some(local), None) = (parts.next(), parts.next(), parts.next()) else {
            return reject("scoped identifiers must have the form @scope/name");
        };
        if scope.is_empty() || local.is_empty() {
            return reject("scoped identifiers must have the form @scope/name");
        }
        if !scope.chars().all(is_identifier_char) || !local.chars().all(is_identifier_char) {
            return reject("only [a-z0-9-_] characters are allowed");
        }
        return Ok(());
    }

    if name.contains('/') {
        return reject("path separators are only allowed in @scope/name form");
    }
    if !name.chars().all(is_identifier_char) {
        return reject("only [a-z0-9-_] characters are allowed");
    }

    Ok(())
}

const fn is_identifier_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '-' | '_')
}

/// Returns whether `identifier` starts with one of the recognised plugin
/// prefixes and has something after it.
///
/// ```
/// use warden_core::validation::has_recognized_prefix;
///
/// let prefixes = vec!["warden-plugin-".to_string()];
/// assert!(has_recognized_prefix("warden-plugin-github", &prefixes));
/// assert!(!has_recognized_prefix("warden-plugin-", &prefixes));
/// assert!(!has_recognized_prefix("left-pad", &prefixes));
/// ```
#[must_use]
pub fn has_recognized_prefix(identifier: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        identifier
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| !rest.is_empty())
    })
}

/// Verifies that `resolved` stays inside `base`.
///
/// Both paths are normalised lexically (`.` dropped, `..` folded) and the
/// relative path from `base` to `resolved` is computed. Containment fails when
/// that relative path would start with a parent reference or be absolute.
/// `base` itself counts as contained.
///
/// Symlinks are not followed; loaders that read the filesystem re-check after
/// canonicalisation.
///
/// # Errors
///
/// Returns [`Error::PathEscape`] when the path leaves `base`.
pub fn verify_containment(resolved: &Path, base: &Path) -> Result<PathBuf> {
    let normalized_base = normalize_lexically(base);
    let normalized = normalize_lexically(resolved);

    match relative_to(&normalized, &normalized_base) {
        Some(relative) => Ok(relative),
        None => {
            tracing::warn!(
                path = %resolved.display(),
                base = %base.display(),
                "Path escapes its base directory"
            );
            Err(Error::PathEscape {
                path: resolved.to_path_buf(),
                base: base.to_path_buf(),
            })
        }
    }
}

/// Returns the path of `path` relative to `base`, or `None` if it would need
/// a parent reference or stay absolute.
fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if path.is_absolute() != base.is_absolute() {
        return None;
    }
    let relative = path.strip_prefix(base).ok()?;
    let escapes = relative
        .components()
        .next()
        .is_some_and(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return None;
    }
    Some(relative.to_path_buf())
}

/// Folds `.` and `..` components without consulting the filesystem.
///
/// `..` directly under the root stays at the root; leading `..` in a relative
/// path is preserved.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}
