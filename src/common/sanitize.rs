//! sanitize.rs -- context-specific neutralization.
//!
//! Two separate functions for two separate contexts:
//!
//! - `escape_html` for anything placed into an HTML page.
//! - `argument_safe` for anything placed into a query tool argument.
//!
//! Neither one substitutes for the other.
//
use crate::error::EdictError;
use crate::validator::FieldName;

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Check a validated value for use as one query tool argument.
///
/// Only characters a validated timestamp, version, port or address can
/// contain are allowed. Anything else means validation let something
/// through, and the field is rejected rather than passed on.
/// A leading `-` is rejected so no value can read as an option.
pub fn argument_safe(field: FieldName, value: &str) -> Result<String, EdictError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-');
    if value.is_empty() || value.starts_with('-') || !value.chars().all(allowed) {
        log::warn!(
            "Field {} value {:?} not safe as a query argument",
            field.as_str(),
            value
        );
        return Err(EdictError::Validation { field });
    }
    Ok(value.to_string())
}

#[test]
fn html_escaping() {
    assert_eq!(
        escape_html("<script>alert('x')</script>"),
        "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
    );
    assert_eq!(escape_html("a & b"), "a &amp; b");
    assert_eq!(escape_html("\"q\" `t` x=y"), "&quot;q&quot; &#x60;t&#x60; x&#x3D;y");
    assert_eq!(escape_html("Make & model: Acme"), "Make &amp; model: Acme");
    assert_eq!(escape_html("plain"), "plain");
}

#[test]
fn argument_checks() {
    assert_eq!(
        argument_safe(FieldName::Timestamp, "2023-01-01T00:00:00Z").unwrap(),
        "2023-01-01T00:00:00Z"
    );
    assert!(argument_safe(FieldName::SourceAddress, "fe80::1").is_ok());
    assert!(argument_safe(FieldName::SourceAddress, "192.168.0.1").is_ok());
    assert!(argument_safe(FieldName::SourcePort, "8080").is_ok());
    for bad in [
        "v4; rm -rf /",
        "$(reboot)",
        "`id`",
        "a|b",
        "a&b",
        "a>b",
        "a b",
        "'q'",
        "\"q\"",
        "a\nb",
        "-rf",
        "",
        "&amp;",
    ] {
        assert!(
            matches!(
                argument_safe(FieldName::ProtocolVersion, bad),
                Err(EdictError::Validation {
                    field: FieldName::ProtocolVersion
                })
            ),
            "accepted {:?}",
            bad
        );
    }
}

#[test]
fn html_escaping_does_not_make_arguments_safe() {
    //  HTML-escaped text still carries shell metacharacters.
    let escaped = escape_html("x; reboot");
    assert!(argument_safe(FieldName::ProtocolVersion, &escaped).is_err());
}
