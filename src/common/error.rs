//! error.rs -- per-request error taxonomy
//!
//! Every failure on a request path ends up as one of these,
//! and every one of these maps to exactly one HTTP status.
//! Only `public_message` text ever goes back to the client.
//! Everything else goes to the log.
//
use crate::validator::FieldName;
use std::time::Duration;
use thiserror::Error;

/// Things that can go wrong handling one request.
#[derive(Debug, Error)]
pub enum EdictError {
    /// Static file not there, or not a regular file.
    #[error("not found: {0}")]
    NotFound(String),
    /// Form field missing or failed its check.
    #[error("invalid or missing field: {field}")]
    Validation { field: FieldName },
    /// Query tool ran too long and was killed.
    #[error("query tool timed out after {0:?}")]
    UpstreamTimeout(Duration),
    /// Query tool exited badly, or produced nothing.
    #[error("query tool failed, exit code {exit_code:?}: {stderr_snippet}")]
    UpstreamFailure {
        exit_code: Option<i32>,
        stderr_snippet: String,
    },
    /// Query tool output did not have START ... END in it.
    #[error("query tool output has no START/END payload")]
    MalformedUpstreamOutput,
    /// Neither GET nor POST.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    /// POST body over the configured limit.
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
    /// Anything else. Bug or I/O trouble.
    #[error("internal error: {0:?}")]
    Internal(#[from] anyhow::Error),
}

impl EdictError {
    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            EdictError::NotFound(_) => 404,
            EdictError::Validation { .. } => 400,
            EdictError::UpstreamTimeout(_) => 504,
            EdictError::UpstreamFailure { .. } => 502,
            EdictError::MalformedUpstreamOutput => 502,
            EdictError::MethodNotAllowed(_) => 405,
            EdictError::PayloadTooLarge(_) => 413,
            EdictError::Internal(_) => 500,
        }
    }

    /// Text which is safe to show the client.
    /// Never includes stderr, paths, or error chains.
    pub fn public_message(&self) -> String {
        match self {
            EdictError::NotFound(_) => "The requested resource was not found.".to_string(),
            EdictError::Validation { field } => {
                format!("Invalid or missing field: {}", field.as_str())
            }
            EdictError::UpstreamTimeout(_) => "The query timed out.".to_string(),
            EdictError::UpstreamFailure { .. } => "The query failed.".to_string(),
            EdictError::MalformedUpstreamOutput => {
                "The query returned an unreadable result.".to_string()
            }
            EdictError::MethodNotAllowed(_) => "Method not allowed.".to_string(),
            EdictError::PayloadTooLarge(_) => "Request body too large.".to_string(),
            EdictError::Internal(_) => "Internal server error.".to_string(),
        }
    }

    /// Client errors are logged quieter than upstream and internal ones.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

impl From<std::io::Error> for EdictError {
    fn from(e: std::io::Error) -> Self {
        EdictError::Internal(e.into())
    }
}

/// Reason phrase for the statuses this server produces.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

#[test]
fn statuses() {
    use anyhow::anyhow;
    assert_eq!(EdictError::NotFound("x".into()).status(), 404);
    assert_eq!(
        EdictError::Validation {
            field: FieldName::Timestamp
        }
        .status(),
        400
    );
    assert_eq!(EdictError::UpstreamTimeout(Duration::from_secs(1)).status(), 504);
    assert_eq!(EdictError::MalformedUpstreamOutput.status(), 502);
    assert_eq!(EdictError::Internal(anyhow!("boom")).status(), 500);
}

#[test]
fn public_message_hides_stderr() {
    let err = EdictError::UpstreamFailure {
        exit_code: Some(3),
        stderr_snippet: "secret table name".to_string(),
    };
    assert_eq!(err.status(), 502);
    assert!(!err.public_message().contains("secret"));
    assert!(!err.public_message().contains('3'));
    //  The log text does have it.
    assert!(err.to_string().contains("secret table name"));
}

#[test]
fn public_message_names_field() {
    let err = EdictError::Validation {
        field: FieldName::SourcePort,
    };
    assert!(err.public_message().contains("source_port"));
    assert!(err.is_client_error());
}
