//! Authenticated mailbox operations
//!
//! An [`Action`] describes one mailbox operation: where it goes, what it sends and how its
//! response reads. [`OperationExecutor`] runs any action for any agent:
//!
//! 1. resolve the agent's credential, or answer with an authorization URL and stop
//! 2. encode the outbound message, if the action carries one
//! 3. make the remote call with the agent's access token
//! 4. classify the response into an [`OperationResult`]

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::config::gmail::PROVIDER;
use crate::error::{GmailApiError, ValidationError};
use crate::gmail::auth::{AuthorizationUrlGenerator, CredentialResolver};
use crate::gmail::client::{ApiRequest, MailboxApi};
use crate::gmail::encoder::encode_message;
use crate::gmail::enrich::{enrich_messages, listed_refs};
use crate::gmail::outcome::{
    AlertVariant, Column, FailureKind, OperationResult, Outcome, Presentation,
};
use crate::gmail::token_store::CredentialRecord;
use crate::gmail::types::{CallerId, DraftRequest, EmailSpec, SendMessageRequest};

/// How an encoded message is wrapped in the request body
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// `{raw, threadId?}`
    Raw { thread_id: Option<String> },
    /// `{id?, message: {raw, threadId?}}`
    Draft {
        id: Option<String>,
        thread_id: Option<String>,
    },
}

/// Request body of an action
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    Json(Value),
    Message { spec: EmailSpec, envelope: Envelope },
}

/// Text derived from the response, or fixed up front
#[derive(Clone)]
pub enum Detail {
    Fixed(String),
    Render(fn(&Value) -> String),
}

impl std::fmt::Debug for Detail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Detail::Fixed(text) => f.debug_tuple("Fixed").field(text).finish(),
            Detail::Render(_) => f.write_str("Render(..)"),
        }
    }
}

impl Detail {
    fn render(&self, data: &Value) -> String {
        match self {
            Detail::Fixed(text) => text.clone(),
            Detail::Render(render) => render(data),
        }
    }
}

/// Listing presentation
#[derive(Debug, Clone)]
pub struct CollectionView {
    /// Response field holding the rows
    pub field: &'static str,
    /// Plural noun used in result texts, e.g. `drafts`
    pub noun: &'static str,
    pub empty_title: &'static str,
    pub empty_message: &'static str,
    pub columns: Vec<Column>,
}

/// How a successful response is read
#[derive(Debug, Clone)]
pub enum Shape {
    /// A single record shown as a card
    Card { title: String, content: Detail },
    /// An acknowledgement shown as a success alert
    Confirmation { title: String, message: Detail },
    /// A list of records shown as a table, empty lists reported as such
    Collection(CollectionView),
    /// A message listing whose rows are enriched with headers before display
    EnrichedMessages(CollectionView),
}

/// Descriptor of one mailbox operation
#[derive(Debug, Clone)]
pub struct Action {
    /// Operation name used in logs, e.g. `drafts.list`
    pub name: &'static str,
    /// What the agent is trying to do, completing "Please authenticate with Google to ..."
    pub purpose: &'static str,
    pub method: Method,
    /// Path relative to the mailbox base URL
    pub path: String,
    pub query: Vec<(String, String)>,
    pub payload: Payload,
    pub shape: Shape,
    /// Result text on success (collections derive theirs from the row count)
    pub success_text: &'static str,
    pub failure_text: &'static str,
    pub failure_title: &'static str,
}

impl Action {
    fn body(&self) -> Result<Option<Value>, ValidationError> {
        match &self.payload {
            Payload::None => Ok(None),
            Payload::Json(value) => Ok(Some(value.clone())),
            Payload::Message { spec, envelope } => {
                let message = SendMessageRequest {
                    raw: encode_message(spec)?.into_string(),
                    thread_id: match envelope {
                        Envelope::Raw { thread_id } | Envelope::Draft { thread_id, .. } => {
                            thread_id.clone()
                        }
                    },
                };
                let body = match envelope {
                    Envelope::Raw { .. } => serde_json::to_value(message),
                    Envelope::Draft { id, .. } => serde_json::to_value(DraftRequest {
                        id: id.clone(),
                        message,
                    }),
                };
                body.map(Some)
                    .map_err(|e| ValidationError::InvalidParameter {
                        name: "message".to_string(),
                        message: e.to_string(),
                    })
            }
        }
    }
}

/// Page size used when a listing does not ask for one
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page the API serves
pub const MAX_PAGE_SIZE: u32 = 500;

/// Paging and filtering for listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
    pub q: Option<String>,
    pub label_ids: Vec<String>,
    pub include_spam_trash: bool,
}

impl ListParams {
    /// Requested page size, clamped to what the API serves
    pub fn page_size(&self) -> u32 {
        self.max_results
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![("maxResults".to_string(), self.page_size().to_string())];
        if let Some(ref token) = self.page_token {
            query.push(("pageToken".to_string(), token.clone()));
        }
        if let Some(ref q) = self.q {
            query.push(("q".to_string(), q.clone()));
        }
        for label_id in &self.label_ids {
            query.push(("labelIds".to_string(), label_id.clone()));
        }
        if self.include_spam_trash {
            query.push(("includeSpamTrash".to_string(), "true".to_string()));
        }
        query
    }
}

/// Path segment for a caller supplied id
pub(crate) fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Runs actions on behalf of agents
#[derive(Clone)]
pub struct OperationExecutor {
    credentials: CredentialResolver,
    api: Arc<dyn MailboxApi>,
    auth_urls: Arc<dyn AuthorizationUrlGenerator>,
}

impl OperationExecutor {
    pub fn new(
        credentials: CredentialResolver,
        api: Arc<dyn MailboxApi>,
        auth_urls: Arc<dyn AuthorizationUrlGenerator>,
    ) -> Self {
        Self {
            credentials,
            api,
            auth_urls,
        }
    }

    /// Run `action` for `caller`
    ///
    /// Never fails: every problem is reported through the returned result.
    pub async fn execute(&self, caller: &CallerId, action: Action) -> OperationResult {
        let Some(credential) = self.credentials.resolve(caller).await else {
            return match self.auth_urls.generate(PROVIDER, caller).await {
                Ok(url) => OperationResult::authorization_required(url, action.purpose),
                Err(e) => {
                    tracing::error!("Could not generate authorization URL for {}: {}", caller, e);
                    OperationResult::failure(
                        FailureKind::AuthorizationUrl,
                        "Failed to generate authentication URL",
                        "Authentication Unavailable",
                        Some(e.to_string()),
                    )
                }
            };
        };

        let body = match action.body() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Rejected {} for agent {}: {}", action.name, caller, e);
                return OperationResult::failure(
                    FailureKind::Encoding,
                    action.failure_text,
                    action.failure_title,
                    Some(e.to_string()),
                );
            }
        };

        let mut request = ApiRequest::new(
            action.method.clone(),
            action.path.clone(),
            credential.access_token.clone(),
        )
        .with_query(action.query.clone());
        if let Some(body) = body {
            request = request.with_body(body);
        }

        tracing::debug!("Running {} for agent {}", action.name, caller);
        let response = match self.api.call(request).await {
            Ok(response) => response,
            Err(e) => return self.remote_failure(caller, &credential, &action, e).await,
        };

        match self.classify(&credential.access_token, &action, response).await {
            Ok(result) => result,
            Err(e) => self.remote_failure(caller, &credential, &action, e).await,
        }
    }

    async fn remote_failure(
        &self,
        caller: &CallerId,
        credential: &CredentialRecord,
        action: &Action,
        error: GmailApiError,
    ) -> OperationResult {
        tracing::error!("{} failed for agent {}: {}", action.name, caller, error);
        if error.is_unauthorized() {
            tracing::warn!("Access token for agent {} was rejected", caller);
            self.credentials.invalidate(caller, credential).await;
        }
        OperationResult::failure(
            FailureKind::Remote,
            action.failure_text,
            action.failure_title,
            error.remote_message().map(str::to_string),
        )
    }

    async fn classify(
        &self,
        bearer_token: &str,
        action: &Action,
        response: Value,
    ) -> Result<OperationResult, GmailApiError> {
        let result = match &action.shape {
            Shape::Card { title, content } => success(
                action.success_text,
                Presentation::Card {
                    title: title.clone(),
                    content: content.render(&response),
                },
                response,
            ),
            Shape::Confirmation { title, message } => success(
                action.success_text,
                Presentation::Alert {
                    variant: AlertVariant::Success,
                    title: title.clone(),
                    message: message.render(&response),
                },
                response,
            ),
            Shape::Collection(view) => {
                let rows = match response.get(view.field) {
                    Some(Value::Array(rows)) => rows.clone(),
                    _ => Vec::new(),
                };
                collection(view, rows, response)
            }
            Shape::EnrichedMessages(view) => {
                let refs = listed_refs(&response)?;
                if refs.is_empty() {
                    return Ok(collection(view, Vec::new(), response));
                }
                let summaries = enrich_messages(self.api.as_ref(), bearer_token, &refs).await?;
                let rows = serde_json::to_value(&summaries)
                    .map_err(|e| GmailApiError::MalformedResponse {
                        message: e.to_string(),
                    })?;
                let rows = match rows {
                    Value::Array(rows) => rows,
                    _ => Vec::new(),
                };
                let mut data = response;
                data[view.field] = Value::Array(rows.clone());
                collection(view, rows, data)
            }
        };
        Ok(result)
    }
}

fn success(text: &str, presentation: Presentation, data: Value) -> OperationResult {
    OperationResult {
        text: text.to_string(),
        outcome: Outcome::Success { data },
        presentation,
    }
}

fn collection(view: &CollectionView, rows: Vec<Value>, data: Value) -> OperationResult {
    if rows.is_empty() {
        let reason = format!("No {} found", view.noun);
        return OperationResult {
            text: reason.clone(),
            outcome: Outcome::Empty { reason, data },
            presentation: Presentation::Alert {
                variant: AlertVariant::Info,
                title: view.empty_title.to_string(),
                message: view.empty_message.to_string(),
            },
        };
    }

    success(
        &format!("Found {} {}", rows.len(), view.noun),
        Presentation::Table {
            columns: view.columns.clone(),
            rows,
        },
        data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::gmail::auth::TokenRefresher;
    use crate::gmail::client::MockMailboxApi;
    use crate::gmail::token_store::{CredentialRecord, MemoryTokenStore, TokenStore};
    use crate::gmail::types::EmailAddress;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedUrl;

    #[async_trait]
    impl AuthorizationUrlGenerator for FixedUrl {
        async fn generate(&self, _provider: &str, caller: &CallerId) -> Result<String, AuthError> {
            Ok(format!("https://auth.example/?state={}", caller))
        }
    }

    struct BrokenUrl;

    #[async_trait]
    impl AuthorizationUrlGenerator for BrokenUrl {
        async fn generate(&self, _provider: &str, _caller: &CallerId) -> Result<String, AuthError> {
            Err(AuthError::AuthorizationUrl {
                message: "OAuth client not configured".to_string(),
            })
        }
    }

    fn card_action(payload: Payload) -> Action {
        Action {
            name: "messages.send",
            purpose: "send emails",
            method: Method::POST,
            path: "messages/send".to_string(),
            query: Vec::new(),
            payload,
            shape: Shape::Card {
                title: "Email Sent".to_string(),
                content: Detail::Fixed("Subject: S".to_string()),
            },
            success_text: "Email sent successfully",
            failure_text: "Failed to send email",
            failure_title: "Failed to Send Email",
        }
    }

    fn labels_action() -> Action {
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
                columns: vec![Column {
                    key: "name",
                    header: "Name",
                }],
            }),
            success_text: "",
            failure_text: "Failed to list labels",
            failure_title: "Failed to List Labels",
        }
    }

    async fn executor_with(
        api: MockMailboxApi,
        token: Option<&str>,
    ) -> (OperationExecutor, Arc<dyn TokenStore>) {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        if let Some(token) = token {
            store
                .set(&CallerId::from("agent"), CredentialRecord::new(token))
                .await;
        }
        let resolver = CredentialResolver::new(store.clone(), None::<Arc<dyn TokenRefresher>>);
        (
            OperationExecutor::new(resolver, Arc::new(api), Arc::new(FixedUrl)),
            store,
        )
    }

    #[test]
    fn test_list_params_query() {
        let params = ListParams {
            max_results: Some(9000),
            q: Some("is:unread".to_string()),
            label_ids: vec!["INBOX".to_string(), "Label_1".to_string()],
            include_spam_trash: true,
            ..Default::default()
        };
        assert_eq!(
            params.to_query(),
            vec![
                ("maxResults".to_string(), "500".to_string()),
                ("q".to_string(), "is:unread".to_string()),
                ("labelIds".to_string(), "INBOX".to_string()),
                ("labelIds".to_string(), "Label_1".to_string()),
                ("includeSpamTrash".to_string(), "true".to_string()),
            ]
        );
        assert_eq!(ListParams::default().page_size(), 100);
        assert_eq!(
            ListParams {
                max_results: Some(0),
                ..Default::default()
            }
            .page_size(),
            1
        );
        assert_eq!(segment("a/b c"), "a%2Fb%20c");
    }

    #[tokio::test]
    async fn test_no_credential_means_no_remote_call() {
        let mut api = MockMailboxApi::new();
        api.expect_call().times(0);
        let (executor, _) = executor_with(api, None).await;

        let result = executor
            .execute(&CallerId::from("agent"), labels_action())
            .await;
        assert_eq!(result.text, "Authentication required");
        assert_eq!(
            result.outcome,
            Outcome::AuthorizationRequired {
                url: "https://auth.example/?state=agent".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_authorization_url_failure() {
        let mut api = MockMailboxApi::new();
        api.expect_call().times(0);
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let executor = OperationExecutor::new(
            CredentialResolver::new(store, None),
            Arc::new(api),
            Arc::new(BrokenUrl),
        );

        let result = executor
            .execute(&CallerId::from("agent"), labels_action())
            .await;
        assert!(matches!(
            result.outcome,
            Outcome::Failure {
                kind: FailureKind::AuthorizationUrl,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_encoding_failure_makes_no_call() {
        let mut api = MockMailboxApi::new();
        api.expect_call().times(0);
        let (executor, _) = executor_with(api, Some("tok")).await;

        let spec = EmailSpec::new(vec![EmailAddress::new("not-an-email")], "S", "B");
        let result = executor
            .execute(
                &CallerId::from("agent"),
                card_action(Payload::Message {
                    spec,
                    envelope: Envelope::Raw { thread_id: None },
                }),
            )
            .await;

        assert_eq!(result.text, "Failed to send email");
        assert!(matches!(
            result.outcome,
            Outcome::Failure {
                kind: FailureKind::Encoding,
                ref message
            } if message.contains("not-an-email")
        ));
    }

    #[tokio::test]
    async fn test_message_payload_is_encoded() {
        let mut api = MockMailboxApi::new();
        api.expect_call()
            .withf(|request| {
                let body = request.body.as_ref().unwrap();
                request.bearer_token == "tok"
                    && body["raw"].as_str().is_some_and(|raw| !raw.contains('='))
                    && body["threadId"] == "t1"
            })
            .times(1)
            .returning(|_| Ok(json!({"id": "m1", "threadId": "t1"})));
        let (executor, _) = executor_with(api, Some("tok")).await;

        let spec = EmailSpec::new(vec![EmailAddress::new("a@b.com")], "S", "B");
        let result = executor
            .execute(
                &CallerId::from("agent"),
                card_action(Payload::Message {
                    spec,
                    envelope: Envelope::Raw {
                        thread_id: Some("t1".to_string()),
                    },
                }),
            )
            .await;

        assert_eq!(result.text, "Email sent successfully");
        assert_eq!(
            result.presentation,
            Presentation::Card {
                title: "Email Sent".to_string(),
                content: "Subject: S".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_collection_success_and_empty() {
        let mut api = MockMailboxApi::new();
        let mut calls = 0;
        api.expect_call().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(json!({"labels": [{"id": "L1", "name": "Work"}, {"id": "L2", "name": "Home"}]}))
            } else {
                Ok(json!({}))
            }
        });
        let (executor, _) = executor_with(api, Some("tok")).await;
        let caller = CallerId::from("agent");

        let found = executor.execute(&caller, labels_action()).await;
        assert_eq!(found.text, "Found 2 labels");
        assert!(matches!(
            found.presentation,
            Presentation::Table { ref rows, .. } if rows.len() == 2
        ));

        let empty = executor.execute(&caller, labels_action()).await;
        assert_eq!(empty.text, "No labels found");
        assert_eq!(
            empty.outcome,
            Outcome::Empty {
                reason: "No labels found".to_string(),
                data: json!({})
            }
        );
    }

    #[tokio::test]
    async fn test_remote_failure_surfaces_message() {
        let mut api = MockMailboxApi::new();
        api.expect_call().times(1).returning(|_| {
            Err(GmailApiError::Remote {
                status: 400,
                message: Some("Invalid label name".to_string()),
            })
        });
        let (executor, store) = executor_with(api, Some("tok")).await;
        let caller = CallerId::from("agent");

        let result = executor.execute(&caller, labels_action()).await;
        assert_eq!(result.text, "Failed to list labels");
        assert_eq!(
            result.presentation,
            Presentation::Alert {
                variant: AlertVariant::Error,
                title: "Failed to List Labels".to_string(),
                message: "Invalid label name".to_string()
            }
        );
        assert!(store.get(&caller).await.is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credential() {
        let mut api = MockMailboxApi::new();
        api.expect_call().times(1).returning(|_| {
            Err(GmailApiError::Remote {
                status: 401,
                message: None,
            })
        });
        let (executor, store) = executor_with(api, Some("revoked")).await;
        let caller = CallerId::from("agent");

        let result = executor.execute(&caller, labels_action()).await;
        assert!(matches!(
            result.outcome,
            Outcome::Failure { ref message, .. } if message == "An unknown error occurred"
        ));
        assert_eq!(store.get(&caller).await, None);
        assert_eq!(store.stored(&caller).await, None);
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_refresh_token() {
        let mut api = MockMailboxApi::new();
        api.expect_call().times(1).returning(|_| {
            Err(GmailApiError::Remote {
                status: 401,
                message: Some("Invalid Credentials".to_string()),
            })
        });
        let (executor, store) = executor_with(api, None).await;
        let caller = CallerId::from("agent");
        store
            .set(&caller, CredentialRecord::new("revoked").with_refresh_token("rt"))
            .await;

        executor.execute(&caller, labels_action()).await;

        assert_eq!(store.get(&caller).await, None);
        let kept = store.stored(&caller).await.unwrap();
        assert_eq!(kept.refresh_token.as_deref(), Some("rt"));
    }
}
