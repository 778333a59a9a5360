//! OAuth authentication for Gmail API
//!
//! Handles the delegated OAuth 2.0 flow for many agents at once:
//! - Loading client credentials
//! - Building per-agent authorization URLs, each with a one-time `state`
//! - Receiving the authorization callback and storing the agent's tokens
//! - Refreshing stale tokens before they are handed out

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use yup_oauth2::ApplicationSecret;

use crate::config::{gmail::PROVIDER, Config};
use crate::error::{AuthError, GmailAgentError, Result};
use crate::gmail::token_store::{now_unix, CredentialRecord, TokenStore};
use crate::gmail::types::CallerId;

/// Seconds an issued authorization `state` stays redeemable
pub const STATE_TTL_SECS: i64 = 600;

/// Produces the URL an agent must visit to grant mailbox access
#[async_trait]
pub trait AuthorizationUrlGenerator: Send + Sync {
    async fn generate(
        &self,
        provider: &str,
        caller: &CallerId,
    ) -> std::result::Result<String, AuthError>;
}

/// Trades a refresh token for a new credential
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<CredentialRecord, AuthError>;
}

/// Trades an authorization code for a credential
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange_code(&self, code: &str)
        -> std::result::Result<CredentialRecord, AuthError>;
}

/// One-time `state` values handed out with authorization URLs
///
/// The callback only stores a credential for a `state` issued here, and each one redeems once.
#[derive(Debug, Default)]
pub struct PendingAuthorizations {
    issued: Mutex<HashMap<String, (CallerId, i64)>>,
}

impl PendingAuthorizations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh `state` for `caller`
    pub async fn issue(&self, caller: &CallerId) -> String {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let now = now_unix();
        let mut issued = self.issued.lock().await;
        issued.retain(|_, (_, issued_at)| now - *issued_at < STATE_TTL_SECS);
        issued.insert(state.clone(), (caller.clone(), now));
        state
    }

    /// Agent `state` was issued for, consuming it
    pub async fn redeem(&self, state: &str) -> Option<CallerId> {
        let (caller, issued_at) = self.issued.lock().await.remove(state)?;
        (now_unix() - issued_at < STATE_TTL_SECS).then_some(caller)
    }
}

/// Why a token endpoint request failed
#[derive(Debug, PartialEq, Eq)]
enum TokenRequestError {
    /// The grant itself was refused
    Rejected(String),
    /// Transport trouble, server errors, client misconfiguration
    Failed(String),
}

impl TokenRequestError {
    fn from_error_body(body: String) -> Self {
        let code = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));
        match code.as_deref() {
            Some("invalid_grant") => TokenRequestError::Rejected(body),
            _ => TokenRequestError::Failed(body),
        }
    }

    fn into_message(self) -> String {
        match self {
            TokenRequestError::Rejected(message) | TokenRequestError::Failed(message) => message,
        }
    }
}

/// Token response from OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    fn into_record(self, fallback_refresh_token: Option<String>) -> CredentialRecord {
        CredentialRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(fallback_refresh_token),
            expires_at: self.expires_in.map(|e| now_unix() + e),
            token_type: self.token_type,
            scope: self.scope,
        }
    }
}

/// Google OAuth client for the delegated flow
pub struct GoogleOAuth {
    /// HTTP client
    http_client: reqwest::Client,

    /// OAuth client credentials
    secret: ApplicationSecret,

    /// Redirect URI registered with Google
    redirect_uri: String,

    /// Requested scopes
    scopes: Vec<String>,

    /// States issued with authorization URLs and not yet redeemed
    pending: Arc<PendingAuthorizations>,
}

impl GoogleOAuth {
    /// Create a client from already loaded credentials
    pub fn new(secret: ApplicationSecret, config: &Config) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            secret,
            redirect_uri: config.oauth_callback_url(),
            scopes: config.scopes.clone(),
            pending: Arc::new(PendingAuthorizations::new()),
        }
    }

    /// States issued by this client, shared with the callback
    pub fn pending(&self) -> Arc<PendingAuthorizations> {
        Arc::clone(&self.pending)
    }

    /// Load client credentials from the configured keys file
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.find_and_copy_oauth_keys()?;
        let secret = load_oauth_keys(&config.oauth_path).await?;
        Ok(Self::new(secret, config))
    }

    /// Authorization URL carrying `state`
    pub fn auth_url(&self, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.secret.auth_uri,
            urlencoding::encode(&self.secret.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, TokenRequestError> {
        let response = self
            .http_client
            .post(&self.secret.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| TokenRequestError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenRequestError::from_error_body(body));
        }

        response
            .json()
            .await
            .map_err(|e| TokenRequestError::Failed(e.to_string()))
    }
}

#[async_trait]
impl AuthorizationUrlGenerator for GoogleOAuth {
    async fn generate(
        &self,
        provider: &str,
        caller: &CallerId,
    ) -> std::result::Result<String, AuthError> {
        if provider != PROVIDER {
            return Err(AuthError::UnsupportedProvider {
                provider: provider.to_string(),
            });
        }
        let state = self.pending.issue(caller).await;
        Ok(self.auth_url(&state))
    }
}

#[async_trait]
impl CodeExchanger for GoogleOAuth {
    async fn exchange_code(
        &self,
        code: &str,
    ) -> std::result::Result<CredentialRecord, AuthError> {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .token_request(&params)
            .await
            .map_err(|e| AuthError::TokenExchangeFailed {
                message: e.into_message(),
            })?;
        Ok(response.into_record(None))
    }
}

#[async_trait]
impl TokenRefresher for GoogleOAuth {
    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<CredentialRecord, AuthError> {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.token_request(&params).await.map_err(|e| match e {
            TokenRequestError::Rejected(message) => AuthError::RefreshTokenRejected { message },
            TokenRequestError::Failed(message) => AuthError::TokenRefreshFailed { message },
        })?;
        Ok(response.into_record(Some(refresh_token.to_string())))
    }
}

/// Load OAuth client credentials (`installed` or `web`) from file
pub async fn load_oauth_keys(path: &Path) -> Result<ApplicationSecret> {
    if !path.exists() {
        return Err(GmailAgentError::Auth(AuthError::KeysFileNotFound {
            path: path.display().to_string(),
        }));
    }

    yup_oauth2::read_application_secret(path)
        .await
        .map_err(|_| GmailAgentError::Auth(AuthError::InvalidKeysFormat))
}

/// Hands out usable credentials, refreshing stale ones when possible
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn TokenStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn TokenStore>, refresher: Option<Arc<dyn TokenRefresher>>) -> Self {
        Self { store, refresher }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Usable credential for `caller`, or `None` when the agent must authorize again
    ///
    /// Every write is conditional on the record read here, so a credential stored meanwhile by
    /// the callback or another refresh wins over this one.
    pub async fn resolve(&self, caller: &CallerId) -> Option<CredentialRecord> {
        let stored = self.store.stored(caller).await?;
        if !stored.is_stale(now_unix()) {
            return Some(stored);
        }

        let (Some(refresh_token), Some(refresher)) =
            (stored.refresh_token.as_deref(), self.refresher.as_ref())
        else {
            tracing::info!("Credential for agent {} expired and cannot be refreshed", caller);
            return self.replace(caller, &stored, None).await;
        };

        match refresher.refresh(refresh_token).await {
            Ok(record) => {
                tracing::debug!("Refreshed access token for agent {}", caller);
                self.replace(caller, &stored, Some(record)).await
            }
            Err(e) if e.is_rejection() => {
                tracing::warn!("Dropping credential for agent {}: {}", caller, e);
                self.replace(caller, &stored, None).await
            }
            Err(e) => {
                tracing::warn!("Could not refresh credential for agent {}: {}", caller, e);
                None
            }
        }
    }

    /// Stop using `rejected` after the API refused it
    ///
    /// A refreshable credential is kept but marked stale, so the next call refreshes it; any
    /// other is dropped. A credential replaced since `rejected` was handed out is left alone.
    pub async fn invalidate(&self, caller: &CallerId, rejected: &CredentialRecord) {
        let replacement = rejected
            .refresh_token
            .as_ref()
            .map(|_| rejected.clone().with_expires_at(now_unix()));
        if !self
            .store
            .replace_if_current(caller, rejected, replacement)
            .await
        {
            tracing::debug!("Credential for agent {} changed while in use, keeping it", caller);
        }
    }

    async fn replace(
        &self,
        caller: &CallerId,
        observed: &CredentialRecord,
        replacement: Option<CredentialRecord>,
    ) -> Option<CredentialRecord> {
        if self
            .store
            .replace_if_current(caller, observed, replacement.clone())
            .await
        {
            replacement
        } else {
            self.store.get(caller).await
        }
    }
}

// ==================== Authorization Callback ====================

/// Shared state of the OAuth callback server
#[derive(Clone)]
pub struct CallbackState {
    exchanger: Arc<dyn CodeExchanger>,
    store: Arc<dyn TokenStore>,
    pending: Arc<PendingAuthorizations>,
    completions: broadcast::Sender<CallerId>,
}

impl CallbackState {
    pub fn new(
        exchanger: Arc<dyn CodeExchanger>,
        store: Arc<dyn TokenStore>,
        pending: Arc<PendingAuthorizations>,
    ) -> Self {
        let (completions, _) = broadcast::channel(16);
        Self {
            exchanger,
            store,
            pending,
            completions,
        }
    }

    /// Receive the identity of every agent whose authorization completes
    pub fn subscribe(&self) -> broadcast::Receiver<CallerId> {
        self.completions.subscribe()
    }
}

/// Router serving `GET /oauth2callback`
pub fn callback_router(state: CallbackState) -> Router {
    Router::new()
        .route("/oauth2callback", get(handle_callback))
        .with_state(state)
}

/// Complete the authorization flow for the agent `state` was issued to
pub async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let (Some(code), Some(issued)) = (params.get("code"), params.get("state")) else {
        tracing::warn!("OAuth callback without code or state");
        return Html("<html><body><h1>Authentication failed</h1><p>No authorization code received.</p></body></html>");
    };

    let Some(caller) = state.pending.redeem(issued).await else {
        tracing::warn!("OAuth callback with unknown or expired state");
        return Html("<html><body><h1>Authentication failed</h1><p>This authorization link is invalid or has expired.</p></body></html>");
    };

    match state.exchanger.exchange_code(code).await {
        Ok(record) => {
            state.store.set(&caller, record).await;
            tracing::info!("Completed OAuth flow for agent {}", caller);
            let _ = state.completions.send(caller);
            Html("<html><body><h1>Authentication successful!</h1><p>You can close this window.</p></body></html>")
        }
        Err(e) => {
            tracing::error!("OAuth flow for agent {} failed: {}", caller, e);
            Html("<html><body><h1>Authentication failed</h1><p>The authorization code could not be exchanged.</p></body></html>")
        }
    }
}

/// Serve the callback router on the configured port until the task is dropped
pub async fn serve_callback(config: &Config, state: CallbackState) -> Result<()> {
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.oauth_callback_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("OAuth callback listening on {}", addr);

    axum::serve(listener, callback_router(state))
        .await
        .map_err(|e| {
            GmailAgentError::Auth(AuthError::CallbackError {
                message: e.to_string(),
            })
        })
}

/// Run the authorization flow for one agent from the terminal
pub async fn authorize_interactive(
    config: &Config,
    oauth: Arc<GoogleOAuth>,
    store: Arc<dyn TokenStore>,
    caller: &CallerId,
) -> Result<()> {
    let auth_url = oauth.generate(PROVIDER, caller).await?;
    eprintln!("\nPlease visit this URL to authorize agent {}:", caller);
    eprintln!("{}\n", auth_url);

    if let Err(e) = open::that(&auth_url) {
        eprintln!("Could not open browser automatically: {}", e);
        eprintln!("Please open the URL manually.");
    }

    let state = CallbackState::new(oauth.clone(), store, oauth.pending());
    let mut completions = state.subscribe();

    eprintln!(
        "Waiting for authentication callback on port {}...",
        config.oauth_callback_port
    );

    let server = serve_callback(config, state);
    tokio::pin!(server);

    loop {
        tokio::select! {
            result = &mut server => {
                result?;
                return Err(GmailAgentError::Auth(AuthError::NoAuthCode));
            }
            completed = completions.recv() => {
                match completed {
                    Ok(agent) if &agent == caller => return Ok(()),
                    Ok(_) => continue,
                    Err(_) => return Err(GmailAgentError::Auth(AuthError::NoAuthCode)),
                }
            }
        }
    }
}
