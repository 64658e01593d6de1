//! Back-office authentication library
//!
//! Talks to the backend's `/auth/*` endpoints and owns the durable credential
//! store. This crate has no knowledge of the refresh state machine; the
//! session crate drives it through the `TokenRefresher` trait and the
//! `CredentialStore`.
//!
//! Credential flow:
//! 1. The client calls `token::login()` with email and password
//! 2. The returned `TokenPair` is stored via `CredentialStore::set_tokens()`
//! 3. The session refreshes through `TokenRefresher::refresh()` (timer or 401)
//! 4. Rotated tokens overwrite the previous pair in the store
//! 5. Logout or a failed refresh calls `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::CredentialStore;
pub use error::{Error, Result};
pub use token::{
    HttpTokenRefresher, LoginRequest, LoginResponse, RegisterRequest, TokenPair, TokenRefresher,
    UserProfile, error_message, login, refresh_tokens, register,
};
