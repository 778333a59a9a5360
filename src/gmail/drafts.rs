//! Draft operations
//!
//! Builders for the [`Action`]s that list, read, create, replace, delete and send drafts.

use reqwest::Method;
use serde_json::{json, Value};

use crate::gmail::operation::{
    segment, Action, CollectionView, Detail, Envelope, ListParams, Payload, Shape,
};
use crate::gmail::outcome::Column;
use crate::gmail::types::{EmailSpec, Format};
use crate::gmail::utils::{extract_body_text, format_address_list, payload_header};

fn drafts_view() -> CollectionView {
    CollectionView {
        field: "drafts",
        noun: "drafts",
        empty_title: "No Drafts Found",
        empty_message: "There are no draft emails in your Gmail account",
        columns: vec![
            Column {
                key: "id",
                header: "Draft ID",
            },
            Column {
                key: "threadId",
                header: "Thread ID",
            },
        ],
    }
}

/// List drafts
pub fn list(params: &ListParams) -> Action {
    // drafts cannot be filtered by label
    let params = ListParams {
        label_ids: Vec::new(),
        ..params.clone()
    };
    Action {
        name: "drafts.list",
        purpose: "view drafts",
        method: Method::GET,
        path: "drafts".to_string(),
        query: params.to_query(),
        payload: Payload::None,
        shape: Shape::Collection(drafts_view()),
        success_text: "Drafts listed successfully",
        failure_text: "Failed to list draft emails",
        failure_title: "Failed to List Drafts",
    }
}

/// Get one draft
pub fn get(draft_id: &str, format: Format) -> Action {
    Action {
        name: "drafts.get",
        purpose: "view draft details",
        method: Method::GET,
        path: format!("drafts/{}", segment(draft_id)),
        query: vec![("format".to_string(), format.as_str().to_string())],
        payload: Payload::None,
        shape: Shape::Card {
            title: "Draft Details".to_string(),
            content: Detail::Render(render_draft),
        },
        success_text: "Draft details retrieved successfully",
        failure_text: "Failed to get draft email details",
        failure_title: "Failed to Get Draft",
    }
}

/// Create a draft from a message description
pub fn create(spec: EmailSpec, thread_id: Option<String>) -> Action {
    Action {
        name: "drafts.create",
        purpose: "create drafts",
        method: Method::POST,
        path: "drafts".to_string(),
        query: Vec::new(),
        shape: Shape::Card {
            title: "Draft Created".to_string(),
            content: Detail::Fixed(summary_lines(None, &spec)),
        },
        payload: Payload::Message {
            spec,
            envelope: Envelope::Draft {
                id: None,
                thread_id,
            },
        },
        success_text: "Draft email created successfully",
        failure_text: "Failed to create draft email",
        failure_title: "Failed to Create Draft",
    }
}

/// Replace the content of an existing draft
pub fn update(draft_id: &str, spec: EmailSpec, thread_id: Option<String>) -> Action {
    Action {
        name: "drafts.update",
        purpose: "update drafts",
        method: Method::PUT,
        path: format!("drafts/{}", segment(draft_id)),
        query: Vec::new(),
        shape: Shape::Card {
            title: "Draft Updated".to_string(),
            content: Detail::Fixed(summary_lines(Some(draft_id), &spec)),
        },
        payload: Payload::Message {
            spec,
            envelope: Envelope::Draft {
                id: Some(draft_id.to_string()),
                thread_id,
            },
        },
        success_text: "Draft email updated successfully",
        failure_text: "Failed to update draft email",
        failure_title: "Failed to Update Draft",
    }
}

/// Permanently delete a draft
pub fn delete(draft_id: &str) -> Action {
    Action {
        name: "drafts.delete",
        purpose: "delete drafts",
        method: Method::DELETE,
        path: format!("drafts/{}", segment(draft_id)),
        query: Vec::new(),
        payload: Payload::None,
        shape: Shape::Card {
            title: "Draft Deleted".to_string(),
            content: Detail::Fixed(format!(
                "Draft ID {} has been permanently deleted",
                draft_id
            )),
        },
        success_text: "Draft email deleted successfully",
        failure_text: "Failed to delete draft email",
        failure_title: "Failed to Delete Draft",
    }
}

/// Send an existing draft
pub fn send(draft_id: &str) -> Action {
    Action {
        name: "drafts.send",
        purpose: "send drafts",
        method: Method::POST,
        path: "drafts/send".to_string(),
        query: Vec::new(),
        payload: Payload::Json(json!({ "id": draft_id })),
        shape: Shape::Card {
            title: "Draft Sent".to_string(),
            content: Detail::Fixed(format!("Draft ID {} has been sent successfully", draft_id)),
        },
        success_text: "Draft email sent successfully",
        failure_text: "Failed to send draft email",
        failure_title: "Failed to Send Draft",
    }
}

fn summary_lines(draft_id: Option<&str>, spec: &EmailSpec) -> String {
    let mut lines = Vec::new();
    if let Some(id) = draft_id {
        lines.push(format!("Draft ID: {}", id));
    }
    lines.push(format!("Subject: {}", spec.subject));
    lines.push(format!("To: {}", format_address_list(&spec.to)));
    lines.join("\n")
}

fn render_draft(draft: &Value) -> String {
    let message = &draft["message"];
    let payload = &message["payload"];
    let header = |name: &str| payload_header(payload, name).unwrap_or("");
    let text = |value: &Value| value.as_str().unwrap_or("").to_string();

    let mut lines = vec![
        format!("Draft ID: {}", text(&draft["id"])),
        format!("Thread ID: {}", text(&message["threadId"])),
        format!(
            "Subject: {}",
            payload_header(payload, "subject").unwrap_or("(No Subject)")
        ),
        format!("From: {}", header("from")),
        format!("To: {}", header("to")),
    ];
    if !header("cc").is_empty() {
        lines.push(format!("CC: {}", header("cc")));
    }
    if !header("bcc").is_empty() {
        lines.push(format!("BCC: {}", header("bcc")));
    }
    lines.push(String::new());
    lines.push("Message:".to_string());
    lines.push(extract_body_text(payload));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::types::EmailAddress;

    fn spec() -> EmailSpec {
        EmailSpec::new(vec![EmailAddress::named("a@b.com", "Ann")], "Plan", "Body")
    }

    #[test]
    fn test_list_ignores_label_filter() {
        let action = list(&ListParams {
            label_ids: vec!["INBOX".to_string()],
            include_spam_trash: true,
            ..Default::default()
        });
        assert_eq!(action.method, Method::GET);
        assert_eq!(action.path, "drafts");
        assert_eq!(
            action.query,
            vec![
                ("maxResults".to_string(), "100".to_string()),
                ("includeSpamTrash".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_update_and_send_contract() {
        let action = update("r-42", spec(), Some("t1".to_string()));
        assert_eq!(action.method, Method::PUT);
        assert_eq!(action.path, "drafts/r-42");
        assert!(matches!(
            action.payload,
            Payload::Message {
                envelope: Envelope::Draft { id: Some(ref id), thread_id: Some(_) },
                ..
            } if id == "r-42"
        ));
        assert!(matches!(action.shape, Shape::Card { content: Detail::Fixed(ref c), .. }
            if c == "Draft ID: r-42\nSubject: Plan\nTo: Ann <a@b.com>"));

        let action = send("r-42");
        assert_eq!(action.method, Method::POST);
        assert_eq!(action.path, "drafts/send");
        assert_eq!(action.payload, Payload::Json(json!({"id": "r-42"})));
    }

    #[test]
    fn test_render_draft() {
        let draft = json!({
            "id": "r-1",
            "message": {
                "id": "m-1",
                "threadId": "t-1",
                "payload": {
                    "mimeType": "text/plain",
                    "headers": [
                        {"name": "To", "value": "a@b.com"},
                        {"name": "Cc", "value": "c@d.com"}
                    ],
                    "body": {"data": "SGVsbG8"}
                }
            }
        });
        let rendered = render_draft(&draft);
        assert!(rendered.starts_with("Draft ID: r-1\nThread ID: t-1\nSubject: (No Subject)"));
        assert!(rendered.contains("CC: c@d.com"));
        assert!(!rendered.contains("BCC"));
        assert!(rendered.ends_with("Message:\nHello"));

        // format=minimal drafts have no payload at all
        assert!(render_draft(&json!({"id": "r-2"})).contains("Draft ID: r-2"));
    }
}
