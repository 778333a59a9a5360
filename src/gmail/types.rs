//! Gmail API type definitions
//!
//! Outbound email model plus the Gmail API request and response shapes used for
//! serialization/deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque key for the agent on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CallerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ==================== Outbound Email ====================

/// A mailbox, optionally with a display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EmailAddress {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EmailAddress {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }
}

/// Body content kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentKind {
    #[default]
    Plain,
    Html,
}

impl ContentKind {
    pub fn from_is_html(is_html: bool) -> Self {
        if is_html {
            ContentKind::Html
        } else {
            ContentKind::Plain
        }
    }

    /// MIME type of the body part
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Plain => "text/plain",
            ContentKind::Html => "text/html",
        }
    }
}

/// Delivery priority hint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// A file attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Structured description of an outbound or updated message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailSpec {
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: String,
    pub body: String,
    pub content_kind: ContentKind,
    pub reply_to: Option<EmailAddress>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub priority: Priority,
    pub attachments: Vec<Attachment>,
}

impl EmailSpec {
    /// Plain-text message to the given recipients
    pub fn new(to: Vec<EmailAddress>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }
}

// ==================== Gmail API Shapes ====================

/// A Gmail message part (MIME part)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    /// MIME type of this part
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Headers for this part
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
}

/// Header in a message part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Header name
    pub name: String,

    /// Header value
    pub value: String,
}

/// A Gmail message as returned with `format=metadata`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Message ID
    pub id: String,

    /// Thread ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Snippet (preview text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    /// Message payload (MIME structure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePart>,
}

/// Reference to a message (id and thread_id only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message ID
    pub id: String,

    /// Thread ID
    #[serde(default)]
    pub thread_id: String,
}

/// Listing row with the headers a reader needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub snippet: String,
}

/// Label color settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelColor {
    /// Text color
    pub text_color: String,

    /// Background color
    pub background_color: String,
}

/// Request to create a label
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLabelRequest {
    /// Label name
    pub name: String,

    /// Message list visibility
    pub message_list_visibility: MessageListVisibility,

    /// Label list visibility
    pub label_list_visibility: LabelListVisibility,

    /// Label color
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<LabelColor>,
}

/// Request to update a label; only the provided fields are sent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLabelRequest {
    /// New name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Message list visibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_list_visibility: Option<MessageListVisibility>,

    /// Label list visibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_list_visibility: Option<LabelListVisibility>,

    /// Label color
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<LabelColor>,
}

/// Request to modify message labels
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModifyMessageRequest {
    /// Label IDs to add
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_label_ids: Option<Vec<String>>,

    /// Label IDs to remove
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_label_ids: Option<Vec<String>>,
}

/// Request to send or create a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Raw RFC822 message (base64url encoded)
    pub raw: String,

    /// Thread ID (for replies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Request to create or replace a draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    /// Draft ID, present when replacing an existing draft
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The message
    pub message: SendMessageRequest,
}

/// Visibility options for labels in message list
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageListVisibility {
    #[default]
    Show,
    Hide,
}

/// Visibility options for labels in label list
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub enum LabelListVisibility {
    #[default]
    #[serde(rename = "labelShow")]
    Show,
    #[serde(rename = "labelShowIfUnread")]
    ShowIfUnread,
    #[serde(rename = "labelHide")]
    Hide,
}

/// Message or draft representation requested from the API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Full,
    Minimal,
    Raw,
    Metadata,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Full => "full",
            Format::Minimal => "minimal",
            Format::Raw => "raw",
            Format::Metadata => "metadata",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_deserialize() {
        let json = r#"{"id":"123","threadId":"456","snippet":"hi","payload":{"headers":[{"name":"Subject","value":"S"}]}}"#;
        let msg: MessageMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "123");
        assert_eq!(msg.thread_id, Some("456".to_string()));
        assert_eq!(msg.payload.unwrap().headers[0].value, "S");
    }

    #[test]
    fn test_update_label_skips_missing_fields() {
        let request = UpdateLabelRequest {
            name: Some("Renamed".to_string()),
            label_list_visibility: Some(LabelListVisibility::ShowIfUnread),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "Renamed", "labelListVisibility": "labelShowIfUnread"})
        );
    }

    #[test]
    fn test_draft_request_serialize() {
        let request = DraftRequest {
            id: None,
            message: SendMessageRequest {
                raw: "abc".to_string(),
                thread_id: None,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"message": {"raw": "abc"}}));
    }

    #[test]
    fn test_caller_id_transparent() {
        let id = CallerId::from("agent-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"agent-7\"");
        assert_eq!(id.to_string(), "agent-7");
    }
}
