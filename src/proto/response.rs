//! Response decoding.
//!
//! Only three things are ever read from a response: the status code, the
//! header/body split, and (for the version query) the `version` field of
//! the JSON body.  Every malformed input maps to a [`ParseError`]; nothing
//! here can panic on untrusted bytes.

use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::version::{self, Version};

const SEPARATOR: &[u8] = b"\r\n\r\n";

/// Offset of the first body byte, if the header block is complete.
pub fn body_offset(raw: &[u8]) -> Option<usize> {
    raw.windows(SEPARATOR.len())
        .position(|w| w == SEPARATOR)
        .map(|i| i + SEPARATOR.len())
}

/// Split off the body that follows the blank line.
pub fn extract_body(raw: &[u8]) -> Result<&[u8], ParseError> {
    body_offset(raw)
        .map(|off| &raw[off..])
        .ok_or(ParseError::NoBodySeparator)
}

/// Read the numeric status code from an `HTTP/1.x NNN ...` status line.
pub fn parse_status(raw: &[u8]) -> Result<u16, ParseError> {
    let line_end = raw
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(ParseError::Malformed)?;
    let line = core::str::from_utf8(&raw[..line_end]).map_err(|_| ParseError::Malformed)?;
    let mut fields = line.split(' ');
    let proto = fields.next().ok_or(ParseError::Malformed)?;
    if !proto.starts_with("HTTP/1.") {
        return Err(ParseError::Malformed);
    }
    let code = fields.next().ok_or(ParseError::Malformed)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::Malformed);
    }
    code.parse().map_err(|_| ParseError::Malformed)
}

/// Trimmed value of the first header named `name`, matched case-insensitively.
fn header<'a>(headers: &'a [u8], name: &str) -> Option<&'a str> {
    let text = core::str::from_utf8(headers).ok()?;
    text.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then_some(value.trim())
    })
}

/// Value of the `Content-Length` header, if present and numeric.
pub fn content_length(headers: &[u8]) -> Option<usize> {
    header(headers, "content-length")?.parse().ok()
}

/// True when the body is sent as-is: no `Transfer-Encoding`, or `identity`.
pub fn is_identity_encoded(headers: &[u8]) -> bool {
    header(headers, "transfer-encoding").map_or(true, |v| v.eq_ignore_ascii_case("identity"))
}

/// Extract the remote version from a JSON body such as
/// `{"version":"1.2.4","notes":"..."}`.
///
/// The body must be a JSON object with a string `version` member; unknown
/// members are ignored.  Arrays and bare values are [`ParseError::Malformed`].
pub fn extract_remote_version(body: &[u8]) -> Result<Version, ParseError> {
    // Some servers pad the body with NULs; the structured part ends before them.
    let end = body
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |i| i + 1);
    let manifest: Map<String, Value> =
        serde_json::from_slice(&body[..end]).map_err(|_| ParseError::Malformed)?;
    let text = manifest
        .get("version")
        .and_then(Value::as_str)
        .ok_or(ParseError::Malformed)?;
    version::parse(text)
}

/// Full decode of a version query response: separator, status, version.
pub fn decode_version_response(raw: &[u8]) -> Result<Version, ParseError> {
    let body = extract_body(raw)?;
    let status = parse_status(raw)?;
    if !(200..300).contains(&status) {
        return Err(ParseError::HttpStatus(status));
    }
    extract_remote_version(body)
}
