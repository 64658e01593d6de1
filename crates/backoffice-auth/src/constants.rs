//! Backend endpoint paths and storage keys
//!
//! Storage keys match the ones the browser client kept in local storage, so
//! an exported session file reads the same in both.

/// Storage entry holding the current access token
pub const ACCESS_TOKEN_KEY: &str = "token";

/// Storage entry holding the current refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Storage entry holding the logged-in user's profile
pub const USER_KEY: &str = "user";

/// Exchanges `{refreshToken}` for a rotated `{accessToken, refreshToken}` pair
pub const REFRESH_PATH: &str = "/auth/refresh";

pub const LOGIN_PATH: &str = "/auth/login";

pub const REGISTER_PATH: &str = "/auth/register";

/// Authenticated; goes through the session transport like any other call
pub const UPDATE_PASSWORD_PATH: &str = "/auth/update-password";

/// Proactive refresh period. Access tokens live 15 minutes on the backend;
/// refreshing at 14 leaves a minute of slack.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 14 * 60;

/// Role string the backend assigns to administrators
pub const ADMIN_ROLE: &str = "ADMIN";
