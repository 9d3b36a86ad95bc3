//! Escapes through resolved filesystem paths.

use std::path::{Path, PathBuf};
use warden_core::{Error, verify_containment};

const BASE: &str = "/srv/warden/plugins/warden-plugin-demo";

#[test]
fn test_base_and_descendants_are_contained() {
    let base = Path::new(BASE);
    for relative in ["", ".", "index.wasm", "dist/index.wasm", "a/b/c/d.wasm", "dist/./x.wasm"] {
        let path = base.join(relative);
        assert!(
            verify_containment(&path, base).is_ok(),
            "{} should be contained",
            path.display()
        );
    }
}

#[test]
fn test_parent_references_escape() {
    let base = Path::new(BASE);
    for relative in ["..", "../x", "dist/../../x", "./../warden-plugin-demo-2/index.wasm"] {
        let path = base.join(relative);
        let err = verify_containment(&path, base).unwrap_err();
        assert!(matches!(err, Error::PathEscape { .. }), "{}", path.display());
    }
}

#[test]
fn test_sibling_with_shared_prefix_escapes() {
    let base = Path::new(BASE);
    let sibling = PathBuf::from(format!("{BASE}-evil/index.wasm"));
    assert!(verify_containment(&sibling, base).is_err());
}

#[test]
fn test_absolute_join_escapes() {
    let base = Path::new(BASE);
    // Joining an absolute path replaces the base entirely.
    let path = base.join("/etc/passwd");
    assert!(verify_containment(&path, base).is_err());
}

#[test]
fn test_parent_folding_back_into_base_is_contained() {
    let base = Path::new(BASE);
    let path = base.join("dist/../index.wasm");
    let relative = verify_containment(&path, base).unwrap();
    assert_eq!(relative, PathBuf::from("index.wasm"));
}

#[test]
fn test_escape_is_a_security_violation() {
    let err = verify_containment(Path::new("/etc"), Path::new(BASE)).unwrap_err();
    assert!(err.is_security_violation());
    assert!(!err.public_message().contains("/etc"));
}
