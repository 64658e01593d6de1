//! Authenticated request path
//!
//! `send()` is the only way application code talks to the backend. It
//! attaches the stored access token, and when the backend answers 401 it
//! refreshes (or joins the refresh already in flight) and replays the request
//! exactly once. Everything else the backend says is returned unchanged.

use std::sync::Arc;

use tracing::{debug, instrument, warn};
use transport::{OutboundRequest, Transport, TransportResponse};

use crate::classify::{Disposition, classify_response};
use crate::error::{Error, Result};
use crate::manager::{EndReason, RefreshTrigger, SessionManager};
use crate::metrics;

/// Request wrapper that remembers whether it has been replayed.
struct PendingRequest {
    request: OutboundRequest,
    retried: bool,
}

/// Transport plus session: the client every API caller goes through.
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
}

impl AuthenticatedClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionManager>) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Send `request` with the current access token.
    ///
    /// Non-401 statuses come back as `Ok` responses. A 401 with no refresh
    /// token stored is also returned as a response. Network failures are
    /// returned as `Error::Transport` without touching the session.
    pub async fn send(&self, request: OutboundRequest) -> Result<TransportResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        self.send_with_id(request, request_id).await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method, path = %request.path, transport = self.transport.id()))]
    async fn send_with_id(
        &self,
        request: OutboundRequest,
        request_id: String,
    ) -> Result<TransportResponse> {
        let mut pending = PendingRequest {
            request,
            retried: false,
        };
        let epoch = self.session.epoch();
        let mut token = self.session.access_token().await;

        loop {
            let mut attempt = pending.request.clone();
            attempt.set_bearer(token.as_ref().map(|t| t.expose().as_str()))?;

            let response = self.transport.execute(attempt).await?;
            let has_refresh_token = self.session.has_refresh_token().await;

            let disposition =
                classify_response(response.status, has_refresh_token, pending.retried);
            if let Some(class) = disposition.class(response.status) {
                debug!(
                    status = response.status.as_u16(),
                    class = class.label(),
                    "request not successful"
                );
            }

            match disposition {
                Disposition::Deliver => {
                    debug!(status = response.status.as_u16(), "response delivered");
                    metrics::record_request(response.status.as_u16());
                    return Ok(response);
                }
                Disposition::Refresh => {
                    pending.retried = true;
                    let current = self.session.access_token().await;
                    if current.is_some() && current != token {
                        debug!("access token rotated while request was in flight, replaying");
                        metrics::record_replay("stale_token");
                        token = current;
                    } else {
                        debug!("access token rejected, refreshing");
                        token = Some(self.session.refresh(RefreshTrigger::Unauthorized).await?);
                        metrics::record_replay("refreshed");
                    }
                }
                Disposition::Fatal => {
                    warn!("request rejected after token refresh");
                    metrics::record_request(response.status.as_u16());
                    // Concurrent replays rejected together end the session once.
                    if !self
                        .session
                        .expire_at(epoch, EndReason::RejectedAfterRefresh)
                        .await
                    {
                        debug!("session already ended by another request");
                    }
                    return Err(Error::Unauthorized);
                }
            }
        }
    }
}
