//! Authenticated session for the back-office backend
//!
//! Owns the one piece of shared mutable state in the client: the credential
//! pair and the refresh cycle that rotates it. Callers hand requests to
//! `AuthenticatedClient::send()` and never see token expiry unless the
//! session itself is lost.
//!
//! Session lifecycle:
//! 1. `SessionManager::login()` stores the pair and arms the refresh timer
//! 2. `send()` attaches the access token; a 401 enters the refresh protocol
//! 3. Concurrent 401s collapse into one refresh call; blocked requests wait
//!    on one-shot channels and replay once with the new token
//! 4. The timer refreshes proactively and rearms after each success
//! 5. A failed refresh, or a 401 after replay, clears storage and ends the
//!    session through `SessionObserver::session_ended()`
//! 6. `logout()` cancels the timer and clears storage; a refresh still in
//!    flight is discarded and its waiters are rejected

pub mod classify;
pub mod client;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod refresh;

#[cfg(test)]
pub(crate) mod testutil;

pub use classify::{Disposition, FailureClass, classify_response};
pub use client::AuthenticatedClient;
pub use error::{Error, Result};
pub use manager::{EndReason, RefreshTrigger, SessionManager, SessionObserver};
