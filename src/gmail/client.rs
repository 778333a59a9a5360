//! Gmail API client
//!
//! Thin transport over the Gmail REST API. Every operation is a single authenticated request
//! described by an [`ApiRequest`]; interpreting the response is left to the caller.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::config::Config;
use crate::error::GmailApiError;

/// One authenticated request against the mailbox API
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP verb
    pub method: Method,

    /// Path relative to the mailbox base URL, e.g. `drafts/abc`
    pub path: String,

    /// Query parameters, repeated keys allowed
    pub query: Vec<(String, String)>,

    /// JSON body
    pub body: Option<Value>,

    /// Access token sent as bearer credential
    pub bearer_token: String,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer_token: bearer_token.into(),
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Remote mailbox API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailboxApi: Send + Sync {
    /// Perform one request, yielding the decoded JSON response (`Null` for an empty body)
    async fn call(&self, request: ApiRequest) -> Result<Value, GmailApiError>;
}

/// Gmail API client
pub struct GmailClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// Mailbox base URL, e.g. `https://gmail.googleapis.com/gmail/v1/users/me`
    base_url: String,
}

impl GmailClient {
    /// Create a client against the configured API base
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(config.api_base_url.clone())
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL for a mailbox-relative path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl MailboxApi for GmailClient {
    async fn call(&self, request: ApiRequest) -> Result<Value, GmailApiError> {
        let url = self.url_for(&request.path);
        tracing::debug!("{} {}", request.method, url);

        let mut builder = self
            .http_client
            .request(request.method, &url)
            .bearer_auth(&request.bearer_token);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| GmailApiError::Transport {
            message: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| GmailApiError::Transport {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(GmailApiError::Remote {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        parse_response_body(&text)
    }
}

/// Decode a success body; DELETE and similar answer with nothing
pub fn parse_response_body(text: &str) -> Result<Value, GmailApiError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| GmailApiError::MalformedResponse {
        message: e.to_string(),
    })
}

/// Pull `error.message` out of a Google API error body
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_for() {
        let client = GmailClient::with_base_url("https://gmail.googleapis.com/gmail/v1/users/me/");
        assert_eq!(
            client.url_for("drafts/send"),
            "https://gmail.googleapis.com/gmail/v1/users/me/drafts/send"
        );
        assert_eq!(
            client.url_for("/labels"),
            "https://gmail.googleapis.com/gmail/v1/users/me/labels"
        );
    }

    #[test]
    fn test_extract_error_message() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#;
        assert_eq!(
            extract_error_message(body),
            Some("Requested entity was not found.".to_string())
        );
        assert_eq!(extract_error_message(r#"{"error":{"code":500}}"#), None);
        assert_eq!(extract_error_message("<html>Bad Gateway</html>"), None);
        assert_eq!(extract_error_message(r#"{"error":"invalid_grant"}"#), None);
    }

    #[test]
    fn test_parse_response_body() {
        assert_eq!(parse_response_body("").unwrap(), Value::Null);
        assert_eq!(parse_response_body("  \n").unwrap(), Value::Null);
        assert_eq!(parse_response_body(r#"{"id":"d1"}"#).unwrap(), json!({"id": "d1"}));
        assert!(matches!(
            parse_response_body("not json"),
            Err(GmailApiError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_api_request_builder() {
        let request = ApiRequest::new(Method::POST, "messages/m1/trash", "token")
            .with_body(json!({}))
            .with_query(vec![("format".to_string(), "full".to_string())]);
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.bearer_token, "token");
        assert_eq!(request.body, Some(json!({})));
        assert_eq!(request.query.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_mailbox_api() {
        let mut mock = MockMailboxApi::new();
        mock.expect_call()
            .withf(|request| request.path == "labels" && request.bearer_token == "t")
            .times(1)
            .returning(|_| Ok(json!({"labels": []})));

        let value = mock
            .call(ApiRequest::new(Method::GET, "labels", "t"))
            .await
            .unwrap();
        assert_eq!(value, json!({"labels": []}));
    }
}
