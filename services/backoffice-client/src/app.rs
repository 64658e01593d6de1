//! Composition root
//!
//! Wires the config into one HTTP client, the durable credential store, the
//! session manager, and the authenticated client, and implements the
//! session-level commands (login, logout, register, password change).

use std::sync::Arc;
use std::time::Duration;

use backoffice_auth::{
    CredentialStore, HttpTokenRefresher, LoginRequest, REGISTER_PATH, RegisterRequest,
    UPDATE_PASSWORD_PATH, UserProfile,
};
use backoffice_session::{AuthenticatedClient, EndReason, SessionManager, SessionObserver};
use common::Secret;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{info, warn};
use transport::{OutboundRequest, ReqwestTransport};

use crate::api::into_json;
use crate::config::Config;

/// Stands in for the browser's redirect to the login page.
#[derive(Default)]
pub struct CliObserver {
    forced_end: Notify,
}

impl CliObserver {
    /// Resolves after a session ends without the user asking for it.
    pub async fn forced_end(&self) {
        self.forced_end.notified().await;
    }
}

impl SessionObserver for CliObserver {
    fn session_ended(&self, reason: &EndReason) {
        if reason.is_forced() {
            warn!(
                reason = reason.label(),
                "session ended, run `backoffice-client login` to sign in again"
            );
            self.forced_end.notify_one();
        }
    }
}

#[derive(Serialize)]
struct PasswordChange<'a> {
    #[serde(rename = "oldPassword")]
    old_password: &'a str,
    #[serde(rename = "newPassword")]
    new_password: &'a str,
}

pub struct App {
    config: Config,
    http: reqwest::Client,
    client: AuthenticatedClient,
}

impl App {
    pub async fn build(config: Config, observer: Arc<dyn SessionObserver>) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.api.timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let store = CredentialStore::load(config.session.credentials_path.clone()).await?;
        let refresher =
            HttpTokenRefresher::new(http.clone(), config.endpoint(&config.session.refresh_path));
        let session = SessionManager::new(
            Arc::new(store),
            Arc::new(refresher),
            observer,
            Duration::from_secs(config.session.refresh_interval_secs),
        );
        let transport = ReqwestTransport::new(http.clone(), &config.api.base_url, timeout)?;
        let client = AuthenticatedClient::new(Arc::new(transport), session);

        Ok(Self {
            config,
            http,
            client,
        })
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        self.client.session()
    }

    /// Exchange email and password for a token pair and start the session.
    pub async fn login(
        &self,
        email: String,
        password: Secret<String>,
    ) -> anyhow::Result<Option<UserProfile>> {
        let url = self.config.endpoint(&self.config.session.login_path);
        let response = backoffice_auth::login(&self.http, &url, &LoginRequest { email, password })
            .await?;
        let (pair, user) = response.into_parts();
        self.session().login(pair, user.clone()).await?;
        if let Some(user) = &user {
            info!(email = %user.email, role = ?user.role, "logged in");
        }
        Ok(user)
    }

    pub async fn logout(&self) -> anyhow::Result<()> {
        self.session().logout().await?;
        Ok(())
    }

    pub async fn register(&self, request: RegisterRequest) -> anyhow::Result<()> {
        let url = self.config.endpoint(REGISTER_PATH);
        backoffice_auth::register(&self.http, &url, &request).await?;
        info!(email = %request.email, "account registered");
        Ok(())
    }

    /// Change the password, then log out so the user signs in with the new one.
    pub async fn update_password(
        &self,
        old_password: &Secret<String>,
        new_password: &Secret<String>,
    ) -> anyhow::Result<()> {
        let request = OutboundRequest::post(UPDATE_PASSWORD_PATH).json(&PasswordChange {
            old_password: old_password.expose(),
            new_password: new_password.expose(),
        })?;
        let response = self.client.send(request).await?;
        into_json(response)?;
        info!("password updated");
        self.logout().await
    }
}
