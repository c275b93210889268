//! outputextractor.rs -- pull the payload out of query tool output.
//
use crate::error::EdictError;

/// Printed by the query tool before its results.
pub const START_MARKER: &str = "START";
/// Printed by the query tool after its results.
pub const END_MARKER: &str = "END";

/// Return the text strictly between the first START and the first END after it.
/// Missing either marker is an error, never an empty or partial payload.
pub fn extract_payload(stdout: &[u8]) -> Result<String, EdictError> {
    let text = String::from_utf8_lossy(stdout);
    let start = text
        .find(START_MARKER)
        .ok_or(EdictError::MalformedUpstreamOutput)?
        + START_MARKER.len();
    let len = text[start..]
        .find(END_MARKER)
        .ok_or(EdictError::MalformedUpstreamOutput)?;
    Ok(text[start..start + len].to_string())
}

#[test]
fn payload_between_markers() {
    assert_eq!(extract_payload(b"STARTdevice-infoEND").unwrap(), "device-info");
    assert_eq!(
        extract_payload(b"checking time: 1672531200\nSTART\nNo match.\nEND\n").unwrap(),
        "\nNo match.\n"
    );
    assert_eq!(extract_payload(b"STARTEND").unwrap(), "");
}

#[test]
fn missing_markers() {
    assert!(matches!(
        extract_payload(b"STARTdevice-info"),
        Err(EdictError::MalformedUpstreamOutput)
    ));
    assert!(matches!(
        extract_payload(b"device-infoEND"),
        Err(EdictError::MalformedUpstreamOutput)
    ));
    //  END before START doesn't count.
    assert!(matches!(
        extract_payload(b"END then START"),
        Err(EdictError::MalformedUpstreamOutput)
    ));
    assert!(matches!(
        extract_payload(b"Invalid timestamp.\n"),
        Err(EdictError::MalformedUpstreamOutput)
    ));
}
