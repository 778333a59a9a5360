//! Per-agent credential storage
//!
//! Each agent holds its own delegated Gmail credential. The store never hands out a record
//! that is expired or about to expire; refreshing is left to
//! [`CredentialResolver`](crate::gmail::auth::CredentialResolver).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::Result;
use crate::gmail::types::CallerId;

/// Seconds before expiry at which a credential stops being handed out
pub const EXPIRY_WINDOW_SECS: i64 = 300;

/// Delegated credential for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Access token
    pub access_token: String,

    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry timestamp (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Granted scopes
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl CredentialRecord {
    /// Record holding only an access token, with no expiry
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            token_type: default_token_type(),
            scope: String::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the access token can no longer be relied on at `now` (Unix seconds)
    pub fn is_stale(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expiry) => expiry - now < EXPIRY_WINDOW_SECS,
            None => false,
        }
    }
}

/// Current time in Unix seconds
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Storage for per-agent credentials
///
/// Lookups never fail: anything unusable reads as `None`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Usable credential for `caller`, if any
    async fn get(&self, caller: &CallerId) -> Option<CredentialRecord>;

    /// Replace the credential for `caller`
    async fn set(&self, caller: &CallerId, record: CredentialRecord);

    /// Forget the credential for `caller`
    async fn clear(&self, caller: &CallerId);

    /// Stored credential for `caller`, stale or not
    async fn stored(&self, caller: &CallerId) -> Option<CredentialRecord>;

    /// Replace the credential for `caller` only if it is still `expected`
    ///
    /// `None` removes it. Returns whether the store changed; a record written since `expected`
    /// was read is left alone.
    async fn replace_if_current(
        &self,
        caller: &CallerId,
        expected: &CredentialRecord,
        replacement: Option<CredentialRecord>,
    ) -> bool;
}

/// In-memory credential map
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<CallerId, CredentialRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_records(records: HashMap<CallerId, CredentialRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    async fn snapshot(&self) -> HashMap<CallerId, CredentialRecord> {
        self.records.read().await.clone()
    }

    async fn remove(&self, caller: &CallerId) -> bool {
        self.records.write().await.remove(caller).is_some()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, caller: &CallerId) -> Option<CredentialRecord> {
        let records = self.records.read().await;
        records
            .get(caller)
            .filter(|record| !record.is_stale(now_unix()))
            .cloned()
    }

    async fn set(&self, caller: &CallerId, record: CredentialRecord) {
        self.records.write().await.insert(caller.clone(), record);
    }

    async fn clear(&self, caller: &CallerId) {
        self.remove(caller).await;
    }

    async fn stored(&self, caller: &CallerId) -> Option<CredentialRecord> {
        self.records.read().await.get(caller).cloned()
    }

    async fn replace_if_current(
        &self,
        caller: &CallerId,
        expected: &CredentialRecord,
        replacement: Option<CredentialRecord>,
    ) -> bool {
        let mut records = self.records.write().await;
        if records.get(caller) != Some(expected) {
            return false;
        }
        match replacement {
            Some(record) => records.insert(caller.clone(), record),
            None => records.remove(caller),
        };
        true
    }
}

/// Credential map written through to a JSON file
pub struct FileTokenStore {
    path: PathBuf,
    inner: MemoryTokenStore,
    // serializes mutate-then-persist so the file always holds the last completed write
    persist: Mutex<()>,
}

impl FileTokenStore {
    /// Open the store at `path`, loading existing records when the file exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        tracing::debug!("Loaded {} stored credentials from {}", records.len(), path.display());

        Ok(Self {
            path,
            inner: MemoryTokenStore::from_records(records),
            persist: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self) {
        let records = self.inner.snapshot().await;
        let result = async {
            let content = serde_json::to_string_pretty(&records)?;
            tokio::fs::write(&self.path, content).await?;
            Ok::<_, crate::error::GmailAgentError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to persist credentials to {}: {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, caller: &CallerId) -> Option<CredentialRecord> {
        self.inner.get(caller).await
    }

    async fn set(&self, caller: &CallerId, record: CredentialRecord) {
        let _guard = self.persist.lock().await;
        self.inner.set(caller, record).await;
        self.save().await;
    }

    async fn clear(&self, caller: &CallerId) {
        let _guard = self.persist.lock().await;
        if self.inner.remove(caller).await {
            self.save().await;
        }
    }

    async fn stored(&self, caller: &CallerId) -> Option<CredentialRecord> {
        self.inner.stored(caller).await
    }

    async fn replace_if_current(
        &self,
        caller: &CallerId,
        expected: &CredentialRecord,
        replacement: Option<CredentialRecord>,
    ) -> bool {
        let _guard = self.persist.lock().await;
        let replaced = self
            .inner
            .replace_if_current(caller, expected, replacement)
            .await;
        if replaced {
            self.save().await;
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_your_write() {
        let store = MemoryTokenStore::new();
        let caller = CallerId::from("agent-1");
        let record = CredentialRecord::new("token-1").with_refresh_token("refresh-1");

        store.set(&caller, record.clone()).await;
        assert_eq!(store.get(&caller).await, Some(record));
    }

    #[tokio::test]
    async fn test_unknown_and_cleared_are_absent() {
        let store = MemoryTokenStore::new();
        let caller = CallerId::from("agent-1");
        assert_eq!(store.get(&caller).await, None);

        store.set(&caller, CredentialRecord::new("token-1")).await;
        store.clear(&caller).await;
        assert_eq!(store.get(&caller).await, None);
    }

    #[tokio::test]
    async fn test_no_cross_caller_reads() {
        let store = MemoryTokenStore::new();
        store
            .set(&CallerId::from("alice"), CredentialRecord::new("alice-token"))
            .await;
        assert_eq!(store.get(&CallerId::from("bob")).await, None);
    }

    #[tokio::test]
    async fn test_stale_record_is_absent_but_stored() {
        let store = MemoryTokenStore::new();
        let caller = CallerId::from("agent-1");
        let record = CredentialRecord::new("old")
            .with_refresh_token("refresh-1")
            .with_expires_at(now_unix() + 10);

        store.set(&caller, record.clone()).await;
        assert_eq!(store.get(&caller).await, None);
        assert_eq!(store.stored(&caller).await, Some(record));
    }

    #[tokio::test]
    async fn test_replace_if_current() {
        let store = MemoryTokenStore::new();
        let caller = CallerId::from("agent-1");
        let observed = CredentialRecord::new("old");
        let newer = CredentialRecord::new("newer");

        assert!(!store.replace_if_current(&caller, &observed, None).await);

        store.set(&caller, observed.clone()).await;
        assert!(
            store
                .replace_if_current(&caller, &observed, Some(newer.clone()))
                .await
        );
        assert_eq!(store.get(&caller).await, Some(newer.clone()));

        // a write landing after `observed` was read survives
        assert!(!store.replace_if_current(&caller, &observed, None).await);
        assert_eq!(store.get(&caller).await, Some(newer.clone()));

        assert!(store.replace_if_current(&caller, &newer, None).await);
        assert_eq!(store.stored(&caller).await, None);
    }

    #[tokio::test]
    async fn test_file_store_skips_write_for_unknown_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileTokenStore::open(&path).await.unwrap();
        store.clear(&CallerId::from("nobody")).await;
        assert!(
            !store
                .replace_if_current(&CallerId::from("nobody"), &CredentialRecord::new("t"), None)
                .await
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let caller = CallerId::from("agent-1");

        let store = FileTokenStore::open(&path).await.unwrap();
        store.set(&caller, CredentialRecord::new("token-1")).await;
        drop(store);

        let reopened = FileTokenStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(&caller).await.map(|r| r.access_token),
            Some("token-1".to_string())
        );

        reopened.clear(&caller).await;
        let reopened = FileTokenStore::open(&path).await.unwrap();
        assert_eq!(reopened.get(&caller).await, None);
    }

    #[test]
    fn test_credential_record_serialize() {
        let record = CredentialRecord::new("test-token")
            .with_refresh_token("refresh-token")
            .with_expires_at(1234567890);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("test-token"));
        assert!(json.contains("refresh-token"));

        let parsed: CredentialRecord =
            serde_json::from_str(r#"{"access_token":"t"}"#).unwrap();
        assert_eq!(parsed.token_type, "Bearer");
        assert_eq!(parsed.expires_at, None);
    }
}
