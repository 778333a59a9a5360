//! Label management for Gmail
//!
//! Builders for the label [`Action`]s.

use reqwest::Method;
use serde_json::{json, Value};

use crate::gmail::operation::{segment, Action, CollectionView, Detail, Payload, Shape};
use crate::gmail::outcome::Column;
use crate::gmail::types::{CreateLabelRequest, UpdateLabelRequest};

/// List all labels
pub fn list() -> Action {
    Action {
        name: "labels.list",
        purpose: "view labels",
        method: Method::GET,
        path: "labels".to_string(),
        query: Vec::new(),
        payload: Payload::None,
        shape: Shape::Collection(CollectionView {
            field: "labels",
            noun: "labels",
            empty_title: "No Labels Found",
            empty_message: "There are no labels in your Gmail account",
            columns: vec![
                Column {
                    key: "id",
                    header: "Label ID",
                },
                Column {
                    key: "name",
                    header: "Name",
                },
                Column {
                    key: "type",
                    header: "Type",
                },
                Column {
                    key: "messageListVisibility",
                    header: "Message List Visibility",
                },
                Column {
                    key: "labelListVisibility",
                    header: "Label List Visibility",
                },
            ],
        }),
        success_text: "Labels listed successfully",
        failure_text: "Failed to list labels",
        failure_title: "Failed to List Labels",
    }
}

/// Get one label
pub fn get(label_id: &str) -> Action {
    Action {
        name: "labels.get",
        purpose: "view labels",
        method: Method::GET,
        path: format!("labels/{}", segment(label_id)),
        query: Vec::new(),
        payload: Payload::None,
        shape: Shape::Card {
            title: "Label Details".to_string(),
            content: Detail::Render(render_label),
        },
        success_text: "Label details retrieved successfully",
        failure_text: "Failed to get label",
        failure_title: "Failed to Get Label",
    }
}

/// Create a Gmail label
pub fn create(request: &CreateLabelRequest) -> Action {
    Action {
        name: "labels.create",
        purpose: "create labels",
        method: Method::POST,
        path: "labels".to_string(),
        query: Vec::new(),
        payload: Payload::Json(json!(request)),
        shape: Shape::Card {
            title: "Label Created".to_string(),
            content: Detail::Render(render_label),
        },
        success_text: "Label created successfully",
        failure_text: "Failed to create label",
        failure_title: "Failed to Create Label",
    }
}

/// Update an existing label; fields left out of `request` keep their value
pub fn update(label_id: &str, request: &UpdateLabelRequest) -> Action {
    Action {
        name: "labels.update",
        purpose: "update labels",
        method: Method::PATCH,
        path: format!("labels/{}", segment(label_id)),
        query: Vec::new(),
        payload: Payload::Json(json!(request)),
        shape: Shape::Card {
            title: "Label Updated".to_string(),
            content: Detail::Render(render_label),
        },
        success_text: "Label updated successfully",
        failure_text: "Failed to update label",
        failure_title: "Failed to Update Label",
    }
}

/// Delete a label
pub fn delete(label_id: &str) -> Action {
    Action {
        name: "labels.delete",
        purpose: "delete labels",
        method: Method::DELETE,
        path: format!("labels/{}", segment(label_id)),
        query: Vec::new(),
        payload: Payload::None,
        shape: Shape::Confirmation {
            title: "Label Deleted".to_string(),
            message: Detail::Fixed(format!("Label {} has been permanently deleted", label_id)),
        },
        success_text: "Label deleted successfully",
        failure_text: "Failed to delete label",
        failure_title: "Failed to Delete Label",
    }
}

fn render_label(label: &Value) -> String {
    let text = |key: &str| label[key].as_str().unwrap_or("").to_string();
    let mut lines = vec![
        format!("Label Name: {}", text("name")),
        format!("ID: {}", text("id")),
        format!("Message List Visibility: {}", text("messageListVisibility")),
        format!("Label List Visibility: {}", text("labelListVisibility")),
    ];
    if let Some(color) = label.get("color").filter(|c| c.is_object()) {
        lines.push("Colors:".to_string());
        lines.push(format!("  Text: {}", color["textColor"].as_str().unwrap_or("")));
        lines.push(format!(
            "  Background: {}",
            color["backgroundColor"].as_str().unwrap_or("")
        ));
    }
    lines.join("\n")
}
