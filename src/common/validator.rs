//! validator.rs -- check form fields before anything uses them.
//!
//! Each logical field has a type-specific check. The first field
//! which fails stops the request with a 400 naming that field.
//! A `SanitizedFields` can only come out of `validate`.
//!
//! ```text
//! License: LGPL.
//! ```
//
use crate::error::EdictError;
use crate::fieldextractor::FormFields;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::net::IpAddr;

/// The logical form fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Timestamp,
    ProtocolVersion,
    SourcePort,
    SourceAddress,
}

impl FieldName {
    /// Form field name, as sent by the browser.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Timestamp => "timestamp",
            FieldName::ProtocolVersion => "protocol_version",
            FieldName::SourcePort => "source_port",
            FieldName::SourceAddress => "source_address",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the query tool is asked to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// Look up by source port.
    V4,
    /// Look up by IPv6 source address.
    V6,
}

impl ProtocolVersion {
    /// Literal the query tool expects.
    pub fn as_arg(&self) -> &'static str {
        match self {
            ProtocolVersion::V4 => "v4",
            ProtocolVersion::V6 => "v6",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "v4" => Some(ProtocolVersion::V4),
            "v6" => Some(ProtocolVersion::V6),
            _ => None,
        }
    }
}

/// Form fields which passed validation.
/// Same fields as the form, in checked and normalized form.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedFields {
    timestamp: DateTime<Utc>,
    protocol_version: ProtocolVersion,
    source_port: Option<u16>,
    source_address: Option<IpAddr>,
}

impl SanitizedFields {
    /// Timestamp in the one format the query tool reads.
    pub fn timestamp_arg(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn source_port(&self) -> Option<u16> {
        self.source_port
    }

    pub fn source_address(&self) -> Option<IpAddr> {
        self.source_address
    }
}

/// Validate all fields. First failure wins.
///
/// Order: timestamp, protocol_version, source_port, source_address.
/// v4 needs a port. v6 needs an IPv6 address.
/// Optional fields which are present still have to be valid.
pub fn validate(fields: &FormFields) -> Result<SanitizedFields, EdictError> {
    let reject = |field: FieldName| {
        log::info!(
            "Validation failed for {}: {:?}",
            field.as_str(),
            fields.get(field.as_str())
        );
        EdictError::Validation { field }
    };
    let timestamp = fields
        .get(FieldName::Timestamp.as_str())
        .and_then(parse_timestamp)
        .ok_or_else(|| reject(FieldName::Timestamp))?;
    let protocol_version = fields
        .get(FieldName::ProtocolVersion.as_str())
        .and_then(ProtocolVersion::parse)
        .ok_or_else(|| reject(FieldName::ProtocolVersion))?;
    let source_port = match fields.get(FieldName::SourcePort.as_str()) {
        Some(s) => Some(parse_port(s).ok_or_else(|| reject(FieldName::SourcePort))?),
        None => None,
    };
    if protocol_version == ProtocolVersion::V4 && source_port.is_none() {
        return Err(reject(FieldName::SourcePort));
    }
    let source_address = match fields.get(FieldName::SourceAddress.as_str()) {
        Some(s) => Some(
            s.parse::<IpAddr>()
                .map_err(|_| reject(FieldName::SourceAddress))?,
        ),
        None => None,
    };
    if protocol_version == ProtocolVersion::V6 && !matches!(source_address, Some(IpAddr::V6(_))) {
        return Err(reject(FieldName::SourceAddress));
    }
    Ok(SanitizedFields {
        timestamp,
        protocol_version,
        source_port,
        source_address,
    })
}

/// Port number, 0..=65535. Digits only.
fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || s.len() > 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u16>().ok()
}

/// Parse a date and time in any of the usual ISO 8601 styles.
///
/// RFC 3339 first. Then date and time separated by `T` or a space,
/// seconds and fractions optional, with a `Z`, an offset, or nothing.
/// No offset means UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let mut naive_formats = Vec::new();
    for sep in ["T", " "] {
        for time in ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"] {
            naive_formats.push(format!("%Y-%m-%d{}{}", sep, time));
        }
    }
    //  Explicit offset
    for fmt in &naive_formats {
        for zone in ["%:z", "%z", " %:z", " %z"] {
            if let Ok(dt) = DateTime::parse_from_str(s, &format!("{}{}", fmt, zone)) {
                return Some(dt.with_timezone(&Utc));
            }
        }
    }
    //  Zulu or no zone at all
    let naive = s
        .strip_suffix('Z')
        .or_else(|| s.strip_suffix('z'))
        .unwrap_or(s);
    naive_formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> FormFields {
        pairs.iter().copied().collect()
    }

    fn failed_field(pairs: &[(&str, &str)]) -> Option<FieldName> {
        match validate(&form(pairs)) {
            Err(EdictError::Validation { field }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn valid_v4() {
        let fields = validate(&form(&[
            ("timestamp", "2023-01-01T00:00:00Z"),
            ("protocol_version", "v4"),
            ("source_port", "8080"),
        ]))
        .expect("valid");
        assert_eq!(fields.timestamp_arg(), "2023-01-01T00:00:00Z");
        assert_eq!(fields.protocol_version(), ProtocolVersion::V4);
        assert_eq!(fields.source_port(), Some(8080));
        assert_eq!(fields.source_address(), None);
    }

    #[test]
    fn valid_v6() {
        let fields = validate(&form(&[
            ("timestamp", "2023-01-01 12:30"),
            ("protocol_version", "v6"),
            ("source_address", "2001:db8::1"),
        ]))
        .expect("valid");
        assert_eq!(fields.timestamp_arg(), "2023-01-01T12:30:00Z");
        assert_eq!(
            fields.source_address(),
            Some("2001:db8::1".parse::<IpAddr>().unwrap())
        );
    }

    #[test]
    fn timestamp_profiles() {
        let cases = [
            ("2023-01-01T00:00:00Z", "2023-01-01T00:00:00Z"),
            ("2023-01-01T00:00:00.123Z", "2023-01-01T00:00:00Z"),
            ("2023-01-01T02:00:00+02:00", "2023-01-01T00:00:00Z"),
            ("2023-01-01 02:00:00+0200", "2023-01-01T00:00:00Z"),
            ("2023-01-01 02:00:00 +02:00", "2023-01-01T00:00:00Z"),
            ("2022-12-31 19:00:00-0500", "2023-01-01T00:00:00Z"),
            ("2023-01-01T00:00:00", "2023-01-01T00:00:00Z"),
            ("2023-01-01 00:00:00", "2023-01-01T00:00:00Z"),
            ("2023-01-01T00:00", "2023-01-01T00:00:00Z"),
            ("2023-01-01 00:00Z", "2023-01-01T00:00:00Z"),
            ("2023-01-01T00:00:00.5", "2023-01-01T00:00:00Z"),
        ];
        for (input, expected) in cases {
            let ts = parse_timestamp(input).unwrap_or_else(|| panic!("rejected {:?}", input));
            assert_eq!(ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(), expected, "for {:?}", input);
        }
        for bad in [
            "not-a-date",
            "2023-01-01",
            "2023-13-01T00:00:00Z",
            "2023-02-30T00:00:00Z",
            "2023-01-01T25:00:00Z",
            "2023-01-01T00:00:00Z; reboot",
            "",
        ] {
            assert!(parse_timestamp(bad).is_none(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn bad_timestamp() {
        assert_eq!(
            failed_field(&[
                ("timestamp", "not-a-date"),
                ("protocol_version", "v4"),
                ("source_port", "8080"),
            ]),
            Some(FieldName::Timestamp)
        );
        assert_eq!(failed_field(&[]), Some(FieldName::Timestamp));
    }

    #[test]
    fn bad_protocol_version() {
        for v in ["v5", "V4", "v4; ls", ""] {
            assert_eq!(
                failed_field(&[
                    ("timestamp", "2023-01-01T00:00:00Z"),
                    ("protocol_version", v),
                    ("source_port", "8080"),
                ]),
                Some(FieldName::ProtocolVersion),
                "for {:?}",
                v
            );
        }
    }

    #[test]
    fn ports() {
        assert_eq!(parse_port("0"), Some(0));
        assert_eq!(parse_port("65535"), Some(65535));
        assert_eq!(parse_port("08080"), Some(8080));
        for bad in ["65536", "-1", "+80", "80a", "", "123456", "8 0"] {
            assert_eq!(parse_port(bad), None, "for {:?}", bad);
        }
        assert_eq!(
            failed_field(&[
                ("timestamp", "2023-01-01T00:00:00Z"),
                ("protocol_version", "v4"),
                ("source_port", "70000"),
            ]),
            Some(FieldName::SourcePort)
        );
        //  v4 requires a port
        assert_eq!(
            failed_field(&[
                ("timestamp", "2023-01-01T00:00:00Z"),
                ("protocol_version", "v4"),
                ("source_address", "10.0.0.1"),
            ]),
            Some(FieldName::SourcePort)
        );
    }

    #[test]
    fn addresses() {
        //  Optional for v4, but must be valid if present.
        assert!(
            validate(&form(&[
                ("timestamp", "2023-01-01T00:00:00Z"),
                ("protocol_version", "v4"),
                ("source_port", "80"),
                ("source_address", "10.0.0.1"),
            ]))
            .is_ok()
        );
        assert_eq!(
            failed_field(&[
                ("timestamp", "2023-01-01T00:00:00Z"),
                ("protocol_version", "v4"),
                ("source_port", "80"),
                ("source_address", "10.0.0.256"),
            ]),
            Some(FieldName::SourceAddress)
        );
        //  v6 requires an IPv6 address.
        assert_eq!(
            failed_field(&[
                ("timestamp", "2023-01-01T00:00:00Z"),
                ("protocol_version", "v6"),
                ("source_address", "10.0.0.1"),
            ]),
            Some(FieldName::SourceAddress)
        );
        assert_eq!(
            failed_field(&[
                ("timestamp", "2023-01-01T00:00:00Z"),
                ("protocol_version", "v6"),
            ]),
            Some(FieldName::SourceAddress)
        );
    }
}
