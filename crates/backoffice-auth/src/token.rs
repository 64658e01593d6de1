//! Login, registration and token refresh
//!
//! All three are unauthenticated POSTs with JSON bodies. The backend spells
//! token fields two ways: `/auth/login` answers with `access_token` /
//! `refresh_token`, `/auth/refresh` with `accessToken` / `refreshToken`.
//! `TokenPair` accepts both.
//!
//! Error bodies carry a `message` that is either a string or, for validation
//! failures, a list of strings. It is surfaced verbatim in the error.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::ADMIN_ROLE;
use crate::error::{Error, Result};

/// Access/refresh credential pair. Both rotate on every refresh.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: Secret<String>,
    #[serde(rename = "refreshToken", alias = "refresh_token")]
    pub refresh_token: Secret<String>,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access.into()),
            refresh_token: Secret::new(refresh.into()),
        }
    }
}

/// Profile returned alongside the tokens at login.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "fullName", default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(rename = "firstName", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }

    /// Full name, else "First Last", else the email address.
    pub fn display_name(&self) -> String {
        if let Some(full) = self.full_name.as_deref().filter(|s| !s.is_empty()) {
            return full.to_string();
        }
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: Secret<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(alias = "accessToken")]
    pub access_token: Secret<String>,
    #[serde(alias = "refreshToken")]
    pub refresh_token: Secret<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl LoginResponse {
    pub fn into_parts(self) -> (TokenPair, Option<UserProfile>) {
        (
            TokenPair {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
            },
            self.user,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: Secret<String>,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub role: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

/// Exchange a refresh token for a rotated pair.
///
/// 401/403 mean the refresh token itself is revoked or expired and map to
/// `InvalidCredentials`; other non-2xx statuses map to `Rejected`.
pub async fn refresh_tokens(
    client: &reqwest::Client,
    url: &str,
    refresh_token: &str,
) -> Result<TokenPair> {
    let response = client
        .post(url)
        .json(&RefreshRequest { refresh_token })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        let message = error_message(&body);

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {message}"
            )));
        }

        return Err(Error::Rejected(format!(
            "token refresh returned {status}: {message}"
        )));
    }

    debug!("token refresh accepted");
    response
        .json::<TokenPair>()
        .await
        .map_err(|e| Error::CredentialParse(format!("invalid refresh response: {e}")))
}

/// Log in with email and password.
pub async fn login(
    client: &reqwest::Client,
    url: &str,
    request: &LoginRequest,
) -> Result<LoginResponse> {
    let response = client
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        if status.is_client_error() {
            return Err(Error::InvalidCredentials(message));
        }
        return Err(Error::Rejected(format!("login returned {status}: {message}")));
    }

    response
        .json::<LoginResponse>()
        .await
        .map_err(|e| Error::CredentialParse(format!("invalid login response: {e}")))
}

/// Create a back-office account with the given role.
pub async fn register(
    client: &reqwest::Client,
    url: &str,
    request: &RegisterRequest,
) -> Result<()> {
    let response = client
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(|e| Error::Http(format!("register request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Rejected(format!(
            "register returned {status}: {}",
            error_message(&body)
        )));
    }
    Ok(())
}

/// Extract the backend's `message` from an error body.
///
/// Falls back to the raw body when it is not JSON or has no message.
pub fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("message")) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        _ if body.is_empty() => String::from("<no body>"),
        _ => body.to_string(),
    }
}

/// The authentication endpoint as seen by the session manager.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenRefresher>`).
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair>> + Send + 'a>>;
}

/// `TokenRefresher` that POSTs to the backend's refresh endpoint.
///
/// Uses its own client rather than the session transport, so a refresh call
/// never carries a bearer token and never re-enters the 401 handling.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenRefresher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair>> + Send + 'a>> {
        Box::pin(refresh_tokens(&self.client, &self.url, refresh_token))
    }
}
