//! Service-specific error types

use thiserror::Error;

/// Command-level failures the CLI reports to the user.
///
/// Session loss is reported through `backoffice_session::Error`; these cover
/// the remaining ways a command can fail.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no password given: set {0} or pass a password file")]
    MissingPassword(&'static str),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
}
