//! Durable credential storage
//!
//! Holds the current `token` / `refreshToken` pair (and the logged-in user's
//! profile) in a small JSON file so a session survives a process restart.
//! All writes use atomic temp-file + rename to prevent corruption on crash. A
//! tokio Mutex serializes concurrent writers; readers clone out under the
//! lock.
//!
//! The store carries no expiry metadata. Expiry is only ever learned from a
//! 401 or from the proactive refresh timer.
//!
//! `in_memory()` gives a store with the same semantics and no file, used by
//! tests and one-shot invocations.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::{TokenPair, UserProfile};

/// On-disk layout. Field names are the storage keys from `constants`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(rename = "token", default, skip_serializing_if = "Option::is_none")]
    access_token: Option<Secret<String>>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<Secret<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserProfile>,
}

/// Thread-safe credential store, optionally backed by a file.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<StoredSession>,
}

impl CredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start, logged out).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let stored: StoredSession = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(
                path = %path.display(),
                logged_in = stored.refresh_token.is_some(),
                "loaded credentials"
            );
            stored
        } else {
            info!(path = %path.display(), "credential file not found, starting logged out");
            let stored = StoredSession::default();
            write_atomic(&path, &stored).await?;
            stored
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoredSession::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.state.lock().await.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.state.lock().await.refresh_token.clone()
    }

    /// Both tokens, or `None` unless both are present.
    pub async fn tokens(&self) -> Option<TokenPair> {
        let state = self.state.lock().await;
        match (&state.access_token, &state.refresh_token) {
            (Some(access), Some(refresh)) => Some(TokenPair {
                access_token: access.clone(),
                refresh_token: refresh.clone(),
            }),
            _ => None,
        }
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.state.lock().await.user.clone()
    }

    /// Overwrite both tokens and persist.
    ///
    /// The in-memory pair is replaced even if persisting fails, so the
    /// running session keeps the rotated tokens; the error tells the caller
    /// the pair will not survive a restart.
    pub async fn set_tokens(&self, pair: TokenPair) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = Some(pair.access_token);
        state.refresh_token = Some(pair.refresh_token);
        debug!("stored rotated token pair");
        self.persist(&state).await
    }

    pub async fn set_user(&self, user: Option<UserProfile>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.user = user;
        self.persist(&state).await
    }

    /// Remove every entry and persist.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = StoredSession::default();
        debug!("cleared credentials");
        self.persist(&state).await
    }

    async fn persist(&self, state: &StoredSession) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, state).await,
            None => Ok(()),
        }
    }
}

/// Write the session to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer tokens.
async fn write_atomic(path: &Path, data: &StoredSession) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
