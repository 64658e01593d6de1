//! Types shared across the back-office client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
