//! Uniform operation results
//!
//! Every mailbox operation ends in an [`OperationResult`]: a short human text, a classified
//! [`Outcome`] and a rendering-agnostic [`Presentation`].

use serde::Serialize;
use serde_json::Value;

use crate::config::gmail::{LOGO_URL, PROVIDER};

/// Message used when a failure carries no explanation of its own
pub const UNKNOWN_ERROR: &str = "An unknown error occurred";

/// Where a failure originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The mailbox API rejected the request or could not be reached
    Remote,
    /// The outbound message did not satisfy encoding preconditions
    Encoding,
    /// No authorization URL could be produced
    AuthorizationUrl,
}

/// Classified result of an operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { data: Value },
    Empty { reason: String, data: Value },
    AuthorizationRequired { url: String },
    Failure { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure { .. })
    }

    /// Response data, if the operation reached the remote API successfully
    pub fn data(&self) -> Option<&Value> {
        match self {
            Outcome::Success { data } | Outcome::Empty { data, .. } => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertVariant {
    Info,
    Success,
    Error,
}

/// Table column: the row field it shows and its header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Column {
    pub key: &'static str,
    pub header: &'static str,
}

/// How a result should be shown, independent of any UI toolkit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Presentation {
    Card {
        title: String,
        content: String,
    },
    Table {
        columns: Vec<Column>,
        rows: Vec<Value>,
    },
    Alert {
        variant: AlertVariant,
        title: String,
        message: String,
    },
    #[serde(rename = "oauth")]
    OAuth {
        title: String,
        content: String,
        logo: String,
        url: String,
        provider: String,
    },
}

/// What every operation hands back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    pub text: String,
    pub outcome: Outcome,
    pub presentation: Presentation,
}

impl OperationResult {
    /// Result asking the caller to authorize with Google before `purpose` can be done
    pub fn authorization_required(url: String, purpose: &str) -> Self {
        Self {
            text: "Authentication required".to_string(),
            presentation: Presentation::OAuth {
                title: "Google Authentication".to_string(),
                content: format!("Please authenticate with Google to {}", purpose),
                logo: LOGO_URL.to_string(),
                url: url.clone(),
                provider: PROVIDER.to_string(),
            },
            outcome: Outcome::AuthorizationRequired { url },
        }
    }

    /// Failed result shown as an error alert
    pub fn failure(
        kind: FailureKind,
        text: impl Into<String>,
        title: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
        Self {
            text: text.into(),
            presentation: Presentation::Alert {
                variant: AlertVariant::Error,
                title: title.into(),
                message: message.clone(),
            },
            outcome: Outcome::Failure { kind, message },
        }
    }
}
