//! fieldextractor.rs -- form body to field map.
//!
//! Handles URL-encoded and multipart/form-data bodies.
//! Never fails. Whatever can't be parsed is just not there,
//! and validation complains about it later.
//
use std::collections::HashMap;

/// Raw form fields, straight from the client. Untrusted.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    fields: HashMap<String, String>,
}

impl FormFields {
    /// Usual new
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. First one wins.
    pub fn insert(&mut self, key: &str, value: &str) {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        self.fields.entry(key).or_insert_with(|| value.to_string());
    }

    /// Value for key, trimmed. Empty values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut fields = FormFields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Parse a form body according to its declared Content-Type.
/// No Content-Type is treated as URL-encoded.
pub fn extract_fields(content_type: Option<&str>, body: &[u8]) -> FormFields {
    let content_type = content_type.unwrap_or("application/x-www-form-urlencoded");
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "application/x-www-form-urlencoded" => extract_urlencoded(body),
        "multipart/form-data" => match boundary_param(content_type) {
            Some(boundary) => extract_multipart(&boundary, body),
            None => {
                log::warn!("Multipart form with no boundary: {}", content_type);
                FormFields::new()
            }
        },
        _ => {
            log::warn!("Unsupported form content type: {}", content_type);
            FormFields::new()
        }
    }
}

fn extract_urlencoded(body: &[u8]) -> FormFields {
    let mut fields = FormFields::new();
    for (k, v) in form_urlencoded::parse(body) {
        fields.insert(&k, &v);
    }
    fields
}

/// Find boundary=... in a multipart Content-Type. May be quoted.
fn boundary_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        } else {
            None
        }
    })
}

/// Get a parameter such as name="x" out of a Content-Disposition header value.
fn disposition_param(disposition: &str, param: &str) -> Option<String> {
    disposition.split(';').skip(1).find_map(|p| {
        let (name, value) = p.split_once('=')?;
        if name.trim().eq_ignore_ascii_case(param) {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Split a multipart body into its parts and keep the plain fields.
/// Parts with a filename are uploads, not fields.
fn extract_multipart(boundary: &str, body: &[u8]) -> FormFields {
    let mut fields = FormFields::new();
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut rest = body;
    //  Skip preamble
    match find_bytes(rest, &delimiter) {
        Some(pos) => rest = &rest[pos + delimiter.len()..],
        None => return fields,
    }
    loop {
        //  "--" after a delimiter means the end.
        if rest.starts_with(b"--") {
            break;
        }
        let next = match find_bytes(rest, &delimiter) {
            Some(pos) => pos,
            None => break, // truncated body; take what we have
        };
        let part = &rest[..next];
        rest = &rest[next + delimiter.len()..];
        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        let part = part.strip_suffix(b"\r\n").unwrap_or(part);
        let (headers, value) = match find_bytes(part, b"\r\n\r\n") {
            Some(pos) => (&part[..pos], &part[pos + 4..]),
            None => continue,
        };
        let headers = String::from_utf8_lossy(headers);
        let disposition = headers.split("\r\n").find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-disposition") {
                Some(value.trim().to_string())
            } else {
                None
            }
        });
        let Some(disposition) = disposition else {
            continue;
        };
        if disposition_param(&disposition, "filename").is_some() {
            log::debug!("Ignoring uploaded file part: {}", disposition);
            continue;
        }
        if let Some(name) = disposition_param(&disposition, "name") {
            fields.insert(&name, &String::from_utf8_lossy(value));
        }
    }
    fields
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[test]
fn urlencoded_fields() {
    let body = b"timestamp=2023-01-01T00%3A00%3A00Z&source_port=8080&protocol_version=v4&extra=a+b";
    let fields = extract_fields(Some("application/x-www-form-urlencoded"), body);
    assert_eq!(fields.get("timestamp"), Some("2023-01-01T00:00:00Z"));
    assert_eq!(fields.get("source_port"), Some("8080"));
    assert_eq!(fields.get("protocol_version"), Some("v4"));
    assert_eq!(fields.get("extra"), Some("a b"));
    assert_eq!(fields.get("source_address"), None);
}

#[test]
fn no_content_type_is_urlencoded() {
    let fields = extract_fields(None, b"source_port=22");
    assert_eq!(fields.get("source_port"), Some("22"));
}

#[test]
fn first_value_wins_and_empty_is_absent() {
    let fields = extract_fields(None, b"Source_Port=1&source_port=2&timestamp=");
    assert_eq!(fields.get("source_port"), Some("1"));
    assert_eq!(fields.get("timestamp"), None);
}

#[test]
fn field_values_are_not_interpreted() {
    let fields = extract_fields(None, b"protocol_version=v4%3B+rm+-rf+%2F");
    assert_eq!(fields.get("protocol_version"), Some("v4; rm -rf /"));
}

#[test]
fn multipart_fields() {
    let body = concat!(
        "preamble\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"timestamp\"\r\n",
        "\r\n",
        "2023-01-01 00:00:00\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"source_port\"\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "443\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n",
        "\r\n",
        "file body\r\n",
        "--XyZ--\r\n",
    );
    let fields = extract_fields(Some("multipart/form-data; boundary=\"XyZ\""), body.as_bytes());
    assert_eq!(fields.get("timestamp"), Some("2023-01-01 00:00:00"));
    assert_eq!(fields.get("source_port"), Some("443"));
    assert_eq!(fields.get("upload"), None);
    assert_eq!(fields.len(), 2);
}

#[test]
fn broken_multipart_is_empty() {
    let fields = extract_fields(Some("multipart/form-data"), b"--x\r\n\r\n");
    assert!(fields.is_empty());
    let fields = extract_fields(Some("multipart/form-data; boundary=zz"), b"no delimiters here");
    assert!(fields.is_empty());
}

#[test]
fn unknown_content_type_is_empty() {
    let fields = extract_fields(Some("application/json"), br#"{"timestamp":"x"}"#);
    assert!(fields.is_empty());
}
