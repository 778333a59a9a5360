//! Outbound message encoding
//!
//! Builds the RFC 2822 text for an [`EmailSpec`] and wraps it in the base64url form the
//! Gmail API expects in `raw`. Sending, creating a draft and replacing a draft all go through
//! [`encode_message`].

use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::ValidationError;
use crate::gmail::types::{EmailSpec, Priority};
use crate::gmail::utils::{
    contains_line_break, encode_mime_header, encode_raw_message, format_address,
    format_address_list, validate_email,
};

/// Line width for base64 attachment content
pub const BASE64_LINE_WIDTH: usize = 76;

const CRLF: &str = "\r\n";

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Transport-ready message, base64url encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage(String);

impl EncodedMessage {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Check the invariants an outbound message must satisfy
pub fn validate_spec(spec: &EmailSpec) -> Result<(), ValidationError> {
    if spec.to.is_empty() {
        return Err(ValidationError::NoRecipients);
    }

    let addresses = spec
        .to
        .iter()
        .chain(&spec.cc)
        .chain(&spec.bcc)
        .chain(spec.reply_to.as_ref());
    for address in addresses {
        if !validate_email(&address.email) {
            return Err(ValidationError::InvalidEmail {
                email: address.email.clone(),
            });
        }
    }

    let mut header_values: Vec<(&str, &str)> = Vec::new();
    if let Some(ref in_reply_to) = spec.in_reply_to {
        header_values.push(("In-Reply-To", in_reply_to));
    }
    for reference in &spec.references {
        header_values.push(("References", reference));
    }
    for attachment in &spec.attachments {
        header_values.push(("Content-Disposition", &attachment.filename));
        header_values.push(("Content-Type", &attachment.content_type));
    }

    match header_values
        .into_iter()
        .find(|(header, value)| {
            contains_line_break(value) || (*header == "Content-Disposition" && value.contains('"'))
        })
    {
        Some((header, _)) => Err(ValidationError::InvalidHeaderValue {
            header: header.to_string(),
        }),
        None => Ok(()),
    }
}

/// Validate and encode a message with a freshly drawn boundary
pub fn encode_message(spec: &EmailSpec) -> Result<EncodedMessage, ValidationError> {
    validate_spec(spec)?;
    let boundary = choose_boundary(spec);
    Ok(EncodedMessage(encode_raw_message(&render_message(
        spec, &boundary,
    ))))
}

/// Render the RFC 2822 text of a message using `boundary` for multipart bodies
///
/// The boundary is only written when the message has attachments. No validation is done here.
pub fn render_message(spec: &EmailSpec, boundary: &str) -> String {
    let mut headers = vec![format!("To: {}", format_address_list(&spec.to))];

    if !spec.cc.is_empty() {
        headers.push(format!("Cc: {}", format_address_list(&spec.cc)));
    }
    if !spec.bcc.is_empty() {
        headers.push(format!("Bcc: {}", format_address_list(&spec.bcc)));
    }

    headers.push(format!("Subject: {}", encode_mime_header(&spec.subject)));
    headers.push("MIME-Version: 1.0".to_string());

    if let Some(ref reply_to) = spec.reply_to {
        headers.push(format!("Reply-To: {}", format_address(reply_to)));
    }
    if let Some(ref in_reply_to) = spec.in_reply_to {
        headers.push(format!("In-Reply-To: {}", in_reply_to));
    }
    if !spec.references.is_empty() {
        headers.push(format!("References: {}", spec.references.join(" ")));
    }

    match spec.priority {
        Priority::High => {
            headers.push("X-Priority: 1".to_string());
            headers.push("X-MSMail-Priority: High".to_string());
        }
        Priority::Low => {
            headers.push("X-Priority: 5".to_string());
            headers.push("X-MSMail-Priority: Low".to_string());
        }
        Priority::Normal => {}
    }

    let body_content_type = format!("Content-Type: {}; charset=utf-8", spec.content_kind.as_str());

    if spec.attachments.is_empty() {
        headers.push(body_content_type);
        return format!("{}{CRLF}{CRLF}{}", headers.join(CRLF), spec.body);
    }

    headers.push(format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"",
        boundary
    ));

    let mut body = String::new();
    body.push_str(&format!("{CRLF}--{boundary}{CRLF}"));
    body.push_str(&format!("{body_content_type}{CRLF}{CRLF}"));
    body.push_str(&spec.body);

    for attachment in &spec.attachments {
        body.push_str(&format!("{CRLF}--{boundary}{CRLF}"));
        body.push_str(&format!("Content-Type: {}{CRLF}", attachment.content_type));
        body.push_str(&format!("Content-Transfer-Encoding: base64{CRLF}"));
        body.push_str(&format!(
            "Content-Disposition: attachment; {}{CRLF}{CRLF}",
            filename_parameter(&attachment.filename)
        ));
        body.push_str(&wrap_base64(&STANDARD.encode(&attachment.content)));
    }
    body.push_str(&format!("{CRLF}--{boundary}--"));

    format!("{}{CRLF}{CRLF}{}", headers.join(CRLF), body)
}

/// `filename` parameter of a Content-Disposition header
///
/// Non-ASCII names use the RFC 2231 extended form; clients do not decode encoded words inside
/// quoted strings.
fn filename_parameter(filename: &str) -> String {
    if filename.is_ascii() {
        format!("filename=\"{}\"", filename.replace('\\', "\\\\"))
    } else {
        format!("filename*=UTF-8''{}", urlencoding::encode(filename))
    }
}

/// Split base64 text into CRLF separated lines of at most [`BASE64_LINE_WIDTH`] characters
pub fn wrap_base64(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(BASE64_LINE_WIDTH)
        // base64 output is ASCII, every chunk boundary is a char boundary
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(CRLF)
}

/// Draw a boundary that occurs nowhere in the message text
pub fn choose_boundary(spec: &EmailSpec) -> String {
    loop {
        let boundary = generate_boundary();
        if !boundary_collides(spec, &boundary) {
            return boundary;
        }
    }
}

fn boundary_collides(spec: &EmailSpec, boundary: &str) -> bool {
    // attachment payloads are base64 and cannot contain '_'
    spec.body.contains(boundary)
        || spec.subject.contains(boundary)
        || spec.attachments.iter().any(|a| {
            a.filename.contains(boundary) || a.content_type.contains(boundary)
        })
}

/// Generate a boundary from the clock and a process-wide counter
fn generate_boundary() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let sequence = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("boundary_{:x}_{:x}", timestamp, sequence)
}
