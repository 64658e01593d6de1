//! Response classification for the authenticated transport
//!
//! Every outcome falls into one of three classes:
//! - transient: any non-401 status or network error, handed to the caller
//! - expiry-recoverable: a first 401 while a refresh token is stored,
//!   absorbed by refreshing and replaying once
//! - session-fatal: a 401 on the replay, or a failed refresh; the session ends
//!
//! Only 401 drives the refresh protocol. 403 means the token was accepted but
//! the role lacks permission, so refreshing would not help.

use transport::StatusCode;

/// Error taxonomy class of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    ExpiryRecoverable,
    SessionFatal,
}

impl FailureClass {
    pub fn label(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::ExpiryRecoverable => "expiry_recoverable",
            FailureClass::SessionFatal => "session_fatal",
        }
    }
}

/// What `send()` does with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Return the response to the caller unchanged.
    Deliver,
    /// Refresh (or pick up an already-rotated token) and replay once.
    Refresh,
    /// End the session and fail the call.
    Fatal,
}

impl Disposition {
    pub fn class(&self, status: StatusCode) -> Option<FailureClass> {
        match self {
            Disposition::Deliver if status.is_success() => None,
            Disposition::Deliver => Some(FailureClass::Transient),
            Disposition::Refresh => Some(FailureClass::ExpiryRecoverable),
            Disposition::Fatal => Some(FailureClass::SessionFatal),
        }
    }
}

/// Decide how to handle a response.
///
/// `retried` is whether this response came from the single replay.
pub fn classify_response(status: StatusCode, has_refresh_token: bool, retried: bool) -> Disposition {
    if status != StatusCode::UNAUTHORIZED {
        return Disposition::Deliver;
    }
    if retried {
        return Disposition::Fatal;
    }
    if has_refresh_token {
        Disposition::Refresh
    } else {
        Disposition::Deliver
    }
}
