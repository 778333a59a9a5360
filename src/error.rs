//! Error types for the Gmail agent tools
//!
//! This module defines the error hierarchy for all operations in the crate.

use thiserror::Error;

/// Main error type for the Gmail agent tools
#[derive(Error, Debug)]
pub enum GmailAgentError {
    /// OAuth authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Gmail API errors
    #[error("Gmail API error: {0}")]
    Gmail(#[from] GmailApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// OAuth authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("OAuth keys file not found: {path}")]
    KeysFileNotFound { path: String },

    #[error("Invalid OAuth keys format: expected 'installed' or 'web' credentials")]
    InvalidKeysFormat,

    #[error("Unsupported OAuth provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Failed to generate authorization URL: {message}")]
    AuthorizationUrl { message: String },

    /// The token endpoint could not be reached or failed on its side
    #[error("Failed to refresh access token: {message}")]
    TokenRefreshFailed { message: String },

    /// The token endpoint refused the refresh token, e.g. `invalid_grant`
    #[error("Refresh token rejected: {message}")]
    RefreshTokenRejected { message: String },

    #[error("OAuth callback error: {message}")]
    CallbackError { message: String },

    #[error("No authorization code provided")]
    NoAuthCode,

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },
}

impl AuthError {
    /// Whether the grant behind a credential is gone for good
    pub fn is_rejection(&self) -> bool {
        matches!(self, AuthError::RefreshTokenRejected { .. })
    }
}

/// Gmail API errors
#[derive(Error, Debug)]
pub enum GmailApiError {
    /// The API answered with a non-success status
    #[error("API request failed ({status}): {}", .message.as_deref().unwrap_or("no error message"))]
    Remote {
        status: u16,
        message: Option<String>,
    },

    /// The API answered with a body that is not the expected JSON
    #[error("Malformed API response: {message}")]
    MalformedResponse { message: String },

    /// The request never produced a response
    #[error("Transport failure: {message}")]
    Transport { message: String },
}

impl GmailApiError {
    /// Message reported by the remote service, if it sent one
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            GmailApiError::Remote { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Whether the remote service rejected the bearer credential itself
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GmailApiError::Remote { status: 401, .. })
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found: {path}")]
    DirNotFound { path: String },

    #[error("Failed to create config directory: {path}")]
    DirCreationFailed { path: String },
}

/// Validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid email address: {email}")]
    InvalidEmail { email: String },

    #[error("At least one recipient is required")]
    NoRecipients,

    #[error("Header {header} must not contain line breaks")]
    InvalidHeaderValue { header: String },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for Gmail agent operations
pub type Result<T> = std::result::Result<T, GmailAgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::KeysFileNotFound {
            path: "/path/to/keys.json".to_string(),
        };
        assert!(err.to_string().contains("/path/to/keys.json"));
    }

    #[test]
    fn test_error_conversion() {
        let auth_err = AuthError::NoAuthCode;
        let err: GmailAgentError = auth_err.into();
        assert!(matches!(err, GmailAgentError::Auth(_)));
    }

    #[test]
    fn test_only_rejected_refresh_is_final() {
        let rejected = AuthError::RefreshTokenRejected {
            message: "invalid_grant".to_string(),
        };
        let unreachable = AuthError::TokenRefreshFailed {
            message: "connection reset".to_string(),
        };
        assert!(rejected.is_rejection());
        assert!(!unreachable.is_rejection());
    }

    #[test]
    fn test_remote_message() {
        let err = GmailApiError::Remote {
            status: 404,
            message: Some("Requested entity was not found.".to_string()),
        };
        assert_eq!(err.remote_message(), Some("Requested entity was not found."));
        assert!(err.to_string().contains("404"));
        assert!(!err.is_unauthorized());

        let err = GmailApiError::Remote {
            status: 401,
            message: None,
        };
        assert_eq!(err.remote_message(), None);
        assert!(err.is_unauthorized());
    }
}
