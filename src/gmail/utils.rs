//! Gmail utility functions
//!
//! Address validation, header and transport encoding helpers, header lookup.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::Value;

use crate::error::{GmailAgentError, Result, ValidationError};
use crate::gmail::types::{EmailAddress, MessagePart};

/// Validate an email address
pub fn validate_email(email: &str) -> bool {
    // validator accepts dotless domains; mail to them never routes
    match email.rsplit_once('@') {
        Some((_, domain)) => {
            validator::validate_email(email)
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Whether a header value would split into several header lines
pub fn contains_line_break(value: &str) -> bool {
    value.contains('\r') || value.contains('\n')
}

/// Encode text for MIME header (RFC 2047)
pub fn encode_mime_header(text: &str) -> String {
    // Check if encoding is needed (non-ASCII characters)
    if text.chars().all(|c| c.is_ascii() && c != '\r' && c != '\n') {
        return text.to_string();
    }

    format!(
        "=?UTF-8?B?{}?=",
        base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
    )
}

/// RFC 5322 specials; a display name holding any of them must be quoted
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

/// Render an address as `Name <email>`, or the bare address without a display name
pub fn format_address(address: &EmailAddress) -> String {
    match address.name.as_deref() {
        Some(name) if !name.is_empty() => {
            format!("{} <{}>", display_name(name), address.email)
        }
        _ => address.email.clone(),
    }
}

fn display_name(name: &str) -> String {
    let encoded = encode_mime_header(name);
    if encoded != name || !name.contains(SPECIALS) {
        return encoded;
    }
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render an address list for a header line
pub fn format_address_list(addresses: &[EmailAddress]) -> String {
    addresses
        .iter()
        .map(format_address)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Encode a raw email message for Gmail API (base64url, no padding)
pub fn encode_raw_message(message: &str) -> String {
    URL_SAFE_NO_PAD.encode(message.as_bytes())
}

/// Decode base64 data in any of the alphabets callers tend to send
/// Handles both padded and non-padded, standard and url-safe encodings
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    let data = data.trim();
    URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(data))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(data))
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(data))
        .map_err(|e| {
            GmailAgentError::Validation(ValidationError::InvalidParameter {
                name: "base64 data".to_string(),
                message: e.to_string(),
            })
        })
}

/// Decode base64url data to string
pub fn decode_base64url_string(data: &str) -> Result<String> {
    let bytes = decode_base64url(data)?;
    String::from_utf8(bytes).map_err(|e| {
        GmailAgentError::Validation(ValidationError::InvalidParameter {
            name: "UTF-8 content".to_string(),
            message: e.to_string(),
        })
    })
}

/// Readable body of a message payload as returned by the API
///
/// Uses the payload's own body when present, else the first text part found depth first,
/// preferring `text/plain` over `text/html`. Undecodable content reads as empty.
pub fn extract_body_text(payload: &Value) -> String {
    fn decode(part: &Value) -> Option<String> {
        let data = part.get("body")?.get("data")?.as_str()?;
        decode_base64url_string(data).ok()
    }

    fn find_part(part: &Value, mime_type: &str) -> Option<String> {
        if part.get("mimeType").and_then(Value::as_str) == Some(mime_type) {
            if let Some(text) = decode(part) {
                return Some(text);
            }
        }
        part.get("parts")?
            .as_array()?
            .iter()
            .find_map(|child| find_part(child, mime_type))
    }

    decode(payload)
        .or_else(|| find_part(payload, "text/plain"))
        .or_else(|| find_part(payload, "text/html"))
        .unwrap_or_default()
}

/// Header value by name from a raw payload (case-insensitive)
pub fn payload_header<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload
        .get("headers")?
        .as_array()?
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.get("value"))
        .and_then(Value::as_str)
}

/// Find header value by name (case-insensitive)
pub fn find_header<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}
