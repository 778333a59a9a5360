//! MCP Tool definitions and handlers
//!
//! Each tool parses its arguments, builds the matching [`Action`] and runs it for the calling
//! agent through the [`OperationExecutor`].

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{GmailAgentError, McpError, Result};
use crate::gmail::operation::{Action, ListParams, OperationExecutor};
use crate::gmail::types::{
    Attachment, CallerId, ContentKind, CreateLabelRequest, EmailAddress, EmailSpec, Format,
    LabelColor, LabelListVisibility, MessageListVisibility, ModifyMessageRequest, Priority,
    UpdateLabelRequest,
};
use crate::gmail::utils::decode_base64url;
use crate::gmail::{drafts, labels, messages};
use crate::mcp::types::{CallToolResult, Tool};

/// Tool handler
#[derive(Clone)]
pub struct ToolHandler {
    executor: OperationExecutor,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(executor: OperationExecutor) -> Self {
        Self { executor }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        tool_definitions()
    }

    /// Call a tool on behalf of `caller`
    pub async fn call_tool(&self, caller: &CallerId, name: &str, args: Value) -> CallToolResult {
        tracing::info!("Tool {} called by agent {}", name, caller);
        match build_action(name, args) {
            Ok(action) => self.executor.execute(caller, action).await.into(),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }
}

/// Definitions of every tool the server offers
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        tool_def::<ListDraftsArgs>("list-drafts", "List all draft emails in Gmail"),
        tool_def::<GetDraftArgs>("get-draft", "Get details of a specific draft email"),
        tool_def::<ComposeArgs>("create-draft", "Create a new draft email"),
        tool_def::<UpdateDraftArgs>(
            "update-draft",
            "Replace the content of an existing draft email",
        ),
        tool_def::<DraftIdArgs>("delete-draft", "Permanently delete a draft email"),
        tool_def::<DraftIdArgs>("send-draft", "Send an existing draft email"),
        tool_def::<ListMessagesArgs>(
            "list-messages",
            "List messages with subject, sender, date and preview",
        ),
        tool_def::<GetMessageArgs>("get-message", "Get details of a specific message"),
        tool_def::<ComposeArgs>("send-message", "Send an email, with optional attachments"),
        tool_def::<ModifyMessageArgs>("modify-message", "Add or remove labels on a message"),
        tool_def::<MessageIdArgs>("trash-message", "Move a message to the trash"),
        tool_def::<MessageIdArgs>("untrash-message", "Remove a message from the trash"),
        tool_def::<NoArgs>("list-labels", "List all labels in the mailbox"),
        tool_def::<LabelIdArgs>("get-label", "Get details of a specific label"),
        tool_def::<CreateLabelArgs>("create-label", "Create a new label"),
        tool_def::<UpdateLabelArgs>("update-label", "Update an existing label"),
        tool_def::<LabelIdArgs>("delete-label", "Permanently delete a label"),
    ]
}

/// Translate a tool call into the action it performs
pub fn build_action(name: &str, args: Value) -> Result<Action> {
    let action = match name {
        "list-drafts" => drafts::list(&parse::<ListDraftsArgs>(args)?.into()),
        "get-draft" => {
            let args: GetDraftArgs = parse(args)?;
            drafts::get(&args.draft_id, args.format.unwrap_or_default())
        }
        "create-draft" => {
            let (spec, thread_id) = parse::<ComposeArgs>(args)?.into_spec()?;
            drafts::create(spec, thread_id)
        }
        "update-draft" => {
            let args: UpdateDraftArgs = parse(args)?;
            let (spec, thread_id) = args.message.into_spec()?;
            drafts::update(&args.draft_id, spec, thread_id)
        }
        "delete-draft" => drafts::delete(&parse::<DraftIdArgs>(args)?.draft_id),
        "send-draft" => drafts::send(&parse::<DraftIdArgs>(args)?.draft_id),
        "list-messages" => messages::list(&parse::<ListMessagesArgs>(args)?.into()),
        "get-message" => {
            let args: GetMessageArgs = parse(args)?;
            messages::get(
                &args.message_id,
                args.format.unwrap_or_default(),
                &args.metadata_headers.unwrap_or_default(),
            )
        }
        "send-message" => {
            let (spec, thread_id) = parse::<ComposeArgs>(args)?.into_spec()?;
            messages::send(spec, thread_id)
        }
        "modify-message" => {
            let args: ModifyMessageArgs = parse(args)?;
            messages::modify(
                &args.message_id,
                &ModifyMessageRequest {
                    add_label_ids: args.add_label_ids,
                    remove_label_ids: args.remove_label_ids,
                },
            )
        }
        "trash-message" => messages::trash(&parse::<MessageIdArgs>(args)?.message_id),
        "untrash-message" => messages::untrash(&parse::<MessageIdArgs>(args)?.message_id),
        "list-labels" => labels::list(),
        "get-label" => labels::get(&parse::<LabelIdArgs>(args)?.label_id),
        "create-label" => {
            let args: CreateLabelArgs = parse(args)?;
            labels::create(&CreateLabelRequest {
                name: args.name,
                message_list_visibility: args.message_list_visibility.unwrap_or_default(),
                label_list_visibility: args.label_list_visibility.unwrap_or_default(),
                color: args.color,
            })
        }
        "update-label" => {
            let args: UpdateLabelArgs = parse(args)?;
            labels::update(
                &args.label_id,
                &UpdateLabelRequest {
                    name: args.name,
                    message_list_visibility: args.message_list_visibility,
                    label_list_visibility: args.label_list_visibility,
                    color: args.color,
                },
            )
        }
        "delete-label" => labels::delete(&parse::<LabelIdArgs>(args)?.label_id),
        _ => {
            return Err(GmailAgentError::Mcp(McpError::UnknownTool {
                name: name.to_string(),
            }))
        }
    };
    Ok(action)
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| {
        GmailAgentError::Mcp(McpError::InvalidArguments {
            message: e.to_string(),
        })
    })
}

// ==================== Tool Arguments ====================

#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ListDraftsArgs {
    /// Maximum number of drafts to return (1-500, default 100)
    max_results: Option<u32>,
    /// Page token from a previous listing
    page_token: Option<String>,
    /// Gmail search query
    q: Option<String>,
    /// Include drafts in spam and trash
    include_spam_trash: Option<bool>,
}

impl From<ListDraftsArgs> for ListParams {
    fn from(args: ListDraftsArgs) -> Self {
        ListParams {
            max_results: args.max_results,
            page_token: args.page_token,
            q: args.q,
            label_ids: Vec::new(),
            include_spam_trash: args.include_spam_trash.unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ListMessagesArgs {
    /// Maximum number of messages to return (1-500, default 100)
    max_results: Option<u32>,
    /// Page token from a previous listing
    page_token: Option<String>,
    /// Gmail search query, e.g. `from:ann is:unread`
    q: Option<String>,
    /// Only return messages carrying all of these labels
    label_ids: Option<Vec<String>>,
    /// Include messages in spam and trash
    include_spam_trash: Option<bool>,
}

impl From<ListMessagesArgs> for ListParams {
    fn from(args: ListMessagesArgs) -> Self {
        ListParams {
            max_results: args.max_results,
            page_token: args.page_token,
            q: args.q,
            label_ids: args.label_ids.unwrap_or_default(),
            include_spam_trash: args.include_spam_trash.unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct DraftIdArgs {
    /// The ID of the draft
    draft_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GetDraftArgs {
    /// The ID of the draft to retrieve
    draft_id: String,
    /// Representation to return (default full)
    format: Option<Format>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct MessageIdArgs {
    /// The ID of the message
    message_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GetMessageArgs {
    /// The ID of the message to retrieve
    message_id: String,
    /// Representation to return (default full)
    format: Option<Format>,
    /// Headers to include when format is metadata
    metadata_headers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ModifyMessageArgs {
    /// The ID of the message to modify
    message_id: String,
    /// Label IDs to add to the message
    add_label_ids: Option<Vec<String>>,
    /// Label IDs to remove from the message
    remove_label_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct AttachmentArgs {
    filename: String,
    /// Base64 encoded file content
    content: String,
    content_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ComposeArgs {
    to: Vec<EmailAddress>,
    cc: Option<Vec<EmailAddress>>,
    bcc: Option<Vec<EmailAddress>>,
    subject: String,
    body: String,
    /// Send the body as HTML instead of plain text
    is_html: Option<bool>,
    attachments: Option<Vec<AttachmentArgs>>,
    priority: Option<Priority>,
    reply_to: Option<EmailAddress>,
    /// Message-ID being replied to
    in_reply_to: Option<String>,
    /// Message-IDs of the thread this message belongs to
    references: Option<Vec<String>>,
    /// Gmail thread to place the message in
    thread_id: Option<String>,
}

impl ComposeArgs {
    fn into_spec(self) -> Result<(EmailSpec, Option<String>)> {
        let attachments = self
            .attachments
            .unwrap_or_default()
            .into_iter()
            .map(|a| -> Result<Attachment> {
                Ok(Attachment {
                    content: decode_base64url(&a.content)?,
                    filename: a.filename,
                    content_type: a.content_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let spec = EmailSpec {
            to: self.to,
            cc: self.cc.unwrap_or_default(),
            bcc: self.bcc.unwrap_or_default(),
            subject: self.subject,
            body: self.body,
            content_kind: ContentKind::from_is_html(self.is_html.unwrap_or(false)),
            reply_to: self.reply_to,
            in_reply_to: self.in_reply_to,
            references: self.references.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            attachments,
        };
        Ok((spec, self.thread_id))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct UpdateDraftArgs {
    /// The ID of the draft to update
    draft_id: String,
    #[serde(flatten)]
    message: ComposeArgs,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct LabelIdArgs {
    /// The ID of the label
    label_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct CreateLabelArgs {
    /// The display name of the label
    name: String,
    message_list_visibility: Option<MessageListVisibility>,
    label_list_visibility: Option<LabelListVisibility>,
    color: Option<LabelColor>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct UpdateLabelArgs {
    /// The ID of the label to update
    label_id: String,
    /// The new display name of the label
    name: Option<String>,
    message_list_visibility: Option<MessageListVisibility>,
    label_list_visibility: Option<LabelListVisibility>,
    color: Option<LabelColor>,
}

// ==================== Schema Definitions ====================

fn tool_def<T: JsonSchema>(name: &str, description: &str) -> Tool {
    let schema = schemars::schema_for!(T);
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: serde_json::to_value(schema)
            .unwrap_or_else(|_| json!({"type": "object", "properties": {}})),
    }
}
