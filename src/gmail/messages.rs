//! Message operations
//!
//! Builders for listing, reading, sending, relabeling, trashing and untrashing messages.

use reqwest::Method;
use serde_json::{json, Value};

use crate::gmail::operation::{
    segment, Action, CollectionView, Detail, Envelope, ListParams, Payload, Shape,
};
use crate::gmail::outcome::Column;
use crate::gmail::types::{EmailSpec, Format, ModifyMessageRequest};
use crate::gmail::utils::{extract_body_text, format_address_list, payload_header};

/// List messages, each row enriched with subject, sender, date and preview
pub fn list(params: &ListParams) -> Action {
    Action {
        name: "messages.list",
        purpose: "view messages",
        method: Method::GET,
        path: "messages".to_string(),
        query: params.to_query(),
        payload: Payload::None,
        shape: Shape::EnrichedMessages(CollectionView {
            field: "messages",
            noun: "messages",
            empty_title: "No Messages Found",
            empty_message: "No messages match the specified criteria",
            columns: vec![
                Column {
                    key: "subject",
                    header: "Subject",
                },
                Column {
                    key: "from",
                    header: "From",
                },
                Column {
                    key: "date",
                    header: "Date",
                },
                Column {
                    key: "snippet",
                    header: "Preview",
                },
            ],
        }),
        success_text: "Messages listed successfully",
        failure_text: "Failed to list messages",
        failure_title: "Failed to List Messages",
    }
}

/// Get one message
pub fn get(message_id: &str, format: Format, metadata_headers: &[String]) -> Action {
    let mut query = vec![("format".to_string(), format.as_str().to_string())];
    query.extend(
        metadata_headers
            .iter()
            .map(|header| ("metadataHeaders".to_string(), header.clone())),
    );

    Action {
        name: "messages.get",
        purpose: "view message details",
        method: Method::GET,
        path: format!("messages/{}", segment(message_id)),
        query,
        payload: Payload::None,
        shape: Shape::Card {
            title: "Message Details".to_string(),
            content: Detail::Render(render_message),
        },
        success_text: "Message details retrieved successfully",
        failure_text: "Failed to get message details",
        failure_title: "Failed to Get Message",
    }
}

/// Send a new message
pub fn send(spec: EmailSpec, thread_id: Option<String>) -> Action {
    Action {
        name: "messages.send",
        purpose: "send emails",
        method: Method::POST,
        path: "messages/send".to_string(),
        query: Vec::new(),
        shape: Shape::Card {
            title: "Email Sent".to_string(),
            content: Detail::Fixed(format!(
                "Subject: {}\nTo: {}",
                spec.subject,
                format_address_list(&spec.to)
            )),
        },
        payload: Payload::Message {
            spec,
            envelope: Envelope::Raw { thread_id },
        },
        success_text: "Email sent successfully",
        failure_text: "Failed to send email",
        failure_title: "Failed to Send Email",
    }
}

/// Add and remove labels on a message
pub fn modify(message_id: &str, request: &ModifyMessageRequest) -> Action {
    Action {
        name: "messages.modify",
        purpose: "modify message labels",
        method: Method::POST,
        path: format!("messages/{}/modify", segment(message_id)),
        query: Vec::new(),
        payload: Payload::Json(json!(request)),
        shape: Shape::Confirmation {
            title: "Message Labels Modified".to_string(),
            message: Detail::Fixed("Message labels modified successfully".to_string()),
        },
        success_text: "Message labels modified successfully",
        failure_text: "Failed to modify message labels",
        failure_title: "Failed to Modify Message Labels",
    }
}

/// Move a message to the trash
pub fn trash(message_id: &str) -> Action {
    Action {
        name: "messages.trash",
        purpose: "trash messages",
        method: Method::POST,
        path: format!("messages/{}/trash", segment(message_id)),
        query: Vec::new(),
        payload: Payload::Json(json!({})),
        shape: Shape::Confirmation {
            title: "Message Moved to Trash".to_string(),
            message: Detail::Fixed(format!("Message {} has been moved to trash", message_id)),
        },
        success_text: "Message moved to trash successfully",
        failure_text: "Failed to move message to trash",
        failure_title: "Failed to Trash Message",
    }
}

/// Take a message back out of the trash
pub fn untrash(message_id: &str) -> Action {
    Action {
        name: "messages.untrash",
        purpose: "untrash messages",
        method: Method::POST,
        path: format!("messages/{}/untrash", segment(message_id)),
        query: Vec::new(),
        payload: Payload::Json(json!({})),
        shape: Shape::Card {
            title: "Message Removed from Trash".to_string(),
            content: Detail::Render(render_untrashed),
        },
        success_text: "Message removed from trash successfully",
        failure_text: "Failed to remove message from trash",
        failure_title: "Failed to Untrash Message",
    }
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or("")
}

fn subject(payload: &Value) -> &str {
    payload_header(payload, "subject").unwrap_or("(No Subject)")
}

fn render_message(message: &Value) -> String {
    let payload = &message["payload"];
    let header = |name: &str| payload_header(payload, name).unwrap_or("");

    let labels = message["labelIds"]
        .as_array()
        .map(|ids| ids.iter().map(text).collect::<Vec<_>>().join(", "))
        .filter(|joined| !joined.is_empty())
        .unwrap_or_else(|| "None".to_string());

    [
        format!("Message ID: {}", text(&message["id"])),
        format!("Thread ID: {}", text(&message["threadId"])),
        format!("Subject: {}", subject(payload)),
        format!("From: {}", header("from")),
        format!("To: {}", header("to")),
        format!("Date: {}", header("date")),
        format!("Labels: {}", labels),
        String::new(),
        "Message:".to_string(),
        extract_body_text(payload),
    ]
    .join("\n")
}

fn render_untrashed(message: &Value) -> String {
    format!(
        "Message ID: {}\nSubject: {}",
        text(&message["id"]),
        subject(&message["payload"])
    )
}
