//! Configuration management for the Gmail agent tools
//!
//! Handles paths, environment variables, and configuration loading.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, GmailAgentError, Result};

/// Configuration for the Gmail agent tools
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for storing configuration files
    pub config_dir: PathBuf,

    /// Path to OAuth keys file (client credentials)
    pub oauth_path: PathBuf,

    /// Path to the per-agent credential store
    pub credentials_path: PathBuf,

    /// Public base URL the OAuth provider redirects back to
    pub redirect_base_url: String,

    /// OAuth callback port
    pub oauth_callback_port: u16,

    /// Gmail API base URL for the authenticated user
    pub api_base_url: String,

    /// Identity used for tool calls that do not name an agent
    pub default_agent: String,

    /// Gmail API scopes
    pub scopes: Vec<String>,
}

impl Config {
    /// Create a new configuration with default paths
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self::with_dir(config_dir))
    }

    /// Create a configuration rooted at `config_dir`, still honouring environment overrides
    pub fn with_dir(config_dir: PathBuf) -> Self {
        let oauth_path = std::env::var("GMAIL_OAUTH_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("gcp-oauth.keys.json"));

        let credentials_path = std::env::var("GMAIL_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("credentials.json"));

        let oauth_callback_port = std::env::var("GMAIL_OAUTH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let redirect_base_url = std::env::var("GMAIL_REDIRECT_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://localhost:{}", oauth_callback_port));

        let api_base_url = std::env::var("GMAIL_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("{}/users/{}", gmail::API_BASE_URL, gmail::USER_ID));

        let default_agent =
            std::env::var("GMAIL_DEFAULT_AGENT").unwrap_or_else(|_| "default".to_string());

        Self {
            config_dir,
            oauth_path,
            credentials_path,
            redirect_base_url,
            oauth_callback_port,
            api_base_url,
            default_agent,
            scopes: vec![
                "https://www.googleapis.com/auth/gmail.modify".to_string(),
                "https://www.googleapis.com/auth/gmail.compose".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
        }
    }

    /// Get the configuration directory, creating it if necessary
    fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::home_dir()
            .ok_or_else(|| {
                GmailAgentError::Config(ConfigError::DirNotFound {
                    path: "~".to_string(),
                })
            })?
            .join(".gmail-agent");

        ensure_dir(&config_dir)?;
        Ok(config_dir)
    }

    /// Redirect URI registered with the OAuth provider
    pub fn oauth_callback_url(&self) -> String {
        format!("{}/oauth2callback", self.redirect_base_url)
    }

    /// Check if OAuth keys file exists
    pub fn oauth_keys_exist(&self) -> bool {
        self.oauth_path.exists()
    }

    /// Try to find OAuth keys in current directory and copy to config dir
    pub fn find_and_copy_oauth_keys(&self) -> Result<bool> {
        let local_oauth = std::env::current_dir()
            .map_err(GmailAgentError::Io)?
            .join("gcp-oauth.keys.json");

        if local_oauth.exists() && !self.oauth_keys_exist() {
            std::fs::copy(&local_oauth, &self.oauth_path).map_err(GmailAgentError::Io)?;
            return Ok(true);
        }

        Ok(false)
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|_| {
            GmailAgentError::Config(ConfigError::DirCreationFailed {
                path: dir.display().to_string(),
            })
        })?;
    }
    Ok(())
}

/// Gmail API constants
pub mod gmail {
    /// Base URL for Gmail API
    pub const API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

    /// User ID for the authenticated user
    pub const USER_ID: &str = "me";

    /// Provider name handed to the authorization URL generator
    pub const PROVIDER: &str = "google";

    /// Logo shown on authorization prompts
    pub const LOGO_URL: &str = "https://www.gstatic.com/images/branding/product/1x/googleg_48dp.png";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_with_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_dir(dir.path().to_path_buf());
        assert_eq!(config.config_dir, dir.path());
        assert!(config.oauth_callback_url().ends_with("/oauth2callback"));
        assert!(!config.default_agent.is_empty());
    }

    #[test]
    fn test_default_scopes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_dir(dir.path().to_path_buf());
        assert_eq!(config.scopes.len(), 4);
        assert!(config.scopes[0].contains("gmail.modify"));
        assert!(config.scopes[1].contains("gmail.compose"));
    }
}
