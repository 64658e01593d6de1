//! Error types for session operations

use crate::classify::FailureClass;

/// Errors surfaced by `send()` and the session manager.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never produced a response. Returned unchanged.
    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    /// Refresh failed or was impossible; credentials have been cleared.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// The request was rejected again after replaying with a fresh token.
    #[error("request still unauthorized after token refresh")]
    Unauthorized,

    #[error("credential storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn class(&self) -> FailureClass {
        match self {
            Error::Transport(_) | Error::Storage(_) => FailureClass::Transient,
            Error::SessionExpired(_) | Error::Unauthorized => FailureClass::SessionFatal,
        }
    }

    /// Whether the session is gone and the user has to log in again.
    pub fn is_session_fatal(&self) -> bool {
        self.class() == FailureClass::SessionFatal
    }
}

impl From<backoffice_auth::Error> for Error {
    fn from(e: backoffice_auth::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
