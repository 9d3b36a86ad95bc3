//! Path traversal through plugin identifiers.

use warden_core::{Error, validate_identifier};

#[test]
fn test_identifier_rejects_empty() {
    let err = validate_identifier("").unwrap_err();
    assert!(err.to_string().contains("empty"), "{err}");
}

#[test]
fn test_identifier_rejects_parent_directory() {
    let dangerous = [
        "..",
        "../etc/passwd",
        "../../root",
        "warden-plugin-..",
        "warden..plugin",
        "@warden/..",
        "@../plugin",
        "@warden/plugin-..x",
    ];

    for name in dangerous {
        let err = validate_identifier(name).unwrap_err();
        assert!(
            matches!(err, Error::InvalidIdentifier { .. }),
            "'{name}' should be rejected as an invalid identifier, got {err:?}"
        );
        assert!(err.is_security_violation());
    }
}

#[test]
fn test_identifier_rejects_unscoped_separators() {
    for name in [
        "warden-plugin-a/b",
        "/warden-plugin-a",
        "warden-plugin-a/",
        "plugins/warden-plugin-a",
    ] {
        assert!(
            validate_identifier(name).is_err(),
            "'{name}' should be rejected (unscoped separator)"
        );
    }
}

#[test]
fn test_identifier_rejects_backslashes() {
    for name in ["warden\\plugin", "..\\..\\windows", "@warden\\plugin"] {
        assert!(
            validate_identifier(name).is_err(),
            "'{name}' should be rejected (backslash)"
        );
    }
}

#[test]
fn test_identifier_rejects_malformed_scopes() {
    for name in ["@", "@/", "@warden", "@warden/", "@/plugin", "@a/b/c", "@@a/b", "a@b"] {
        assert!(
            validate_identifier(name).is_err(),
            "'{name}' should be rejected (malformed scope)"
        );
    }
}

#[test]
fn test_identifier_rejects_control_and_unicode() {
    for name in [
        "plugin\0",
        "plugin\n",
        "plugin\t",
        "plügin",
        "plugin\u{202e}",
        "ＰＬＵＧＩＮ",
        "%2e%2e",
        "plugin~",
        "plugin:1",
    ] {
        assert!(
            validate_identifier(name).is_err(),
            "{name:?} should be rejected"
        );
    }
}

#[test]
fn test_identifier_accepts_realistic_names() {
    for name in [
        "warden-plugin-github",
        "warden-plugin-slack_v2",
        "@warden/plugin-jira",
        "@acme-corp/warden-plugin-crm",
        "0",
    ] {
        assert!(validate_identifier(name).is_ok(), "'{name}' should be accepted");
    }
}

#[test]
fn test_error_does_not_leak_on_public_message() {
    let err = validate_identifier("../../etc/shadow").unwrap_err();
    let public = err.public_message();
    assert!(public.contains("invalid plugin identifier"));
}
