//! In-process fakes for the backend and the login redirect.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backoffice_auth::{CredentialStore, TokenPair, TokenRefresher};
use tokio::sync::Notify;
use transport::{OutboundRequest, StatusCode, Transport, TransportError, TransportResponse};

use crate::manager::{EndReason, SessionManager, SessionObserver};

/// Fake backend serving both the API and the refresh endpoint.
///
/// Accepts exactly one access token at a time. The n-th refresh issues
/// `at_n` / `rt_n` and makes `at_n` the accepted token.
pub(crate) struct FakeBackend {
    valid_access: Mutex<String>,
    refresh_calls: AtomicUsize,
    refresh_tokens_seen: Mutex<Vec<String>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
    hold: AtomicBool,
    release: Notify,
    fail_refresh: AtomicBool,
    always_unauthorized: AtomicBool,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new("at_0".into()),
            refresh_calls: AtomicUsize::new(0),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            hold: AtomicBool::new(false),
            release: Notify::new(),
            fail_refresh: AtomicBool::new(false),
            always_unauthorized: AtomicBool::new(false),
        })
    }

    /// Make the current access token stale without a refresh.
    pub(crate) fn expire_access_token(&self) {
        *self.valid_access.lock().unwrap() = "at_expired".into();
    }

    /// Block refresh calls until `release_refresh()`.
    pub(crate) fn hold_refresh(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release_refresh(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    pub(crate) fn fail_refresh(&self) {
        self.fail_refresh.store(true, Ordering::SeqCst);
    }

    /// Reject every API request, even with a fresh token.
    pub(crate) fn always_unauthorized(&self) {
        self.always_unauthorized.store(true, Ordering::SeqCst);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().unwrap().clone()
    }

    /// `(path, bearer token)` of every API request, in arrival order.
    pub(crate) fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, request: &OutboundRequest) -> transport::Result<TransportResponse> {
        let bearer = request.bearer().map(str::to_string);
        self.requests
            .lock()
            .unwrap()
            .push((request.path.clone(), bearer.clone()));

        if request.path == "/boom" {
            return Err(TransportError::Connect("connection refused".into()));
        }
        if request.path == "/status/500" {
            return Ok(json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"message":"boom"}"#,
            ));
        }

        let valid = self.valid_access.lock().unwrap().clone();
        if self.always_unauthorized.load(Ordering::SeqCst) || bearer.as_deref() != Some(&valid) {
            return Ok(json_response(
                StatusCode::UNAUTHORIZED,
                r#"{"message":"Unauthorized"}"#,
            ));
        }
        Ok(json_response(StatusCode::OK, r#"{"ok":true}"#))
    }
}

pub(crate) fn json_response(status: StatusCode, body: &'static str) -> TransportResponse {
    let mut response = TransportResponse::new(status, body);
    response.headers.insert(
        transport::header::CONTENT_TYPE,
        transport::header::HeaderValue::from_static("application/json"),
    );
    response
}

impl Transport for FakeBackend {
    fn id(&self) -> &str {
        "fake"
    }

    fn execute(
        &self,
        request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<TransportResponse>> + Send + '_>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.respond(&request)
        })
    }
}

impl TokenRefresher for FakeBackend {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = backoffice_auth::Result<TokenPair>> + Send + 'a>> {
        Box::pin(async move {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.refresh_tokens_seen
                .lock()
                .unwrap()
                .push(refresh_token.to_string());

            if self.hold.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(backoffice_auth::Error::InvalidCredentials(
                    "refresh token expired".into(),
                ));
            }

            let access = format!("at_{n}");
            *self.valid_access.lock().unwrap() = access.clone();
            Ok(TokenPair::new(access, format!("rt_{n}")))
        })
    }
}

/// Records the labels of every session end it is told about.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    reasons: Mutex<Vec<&'static str>>,
}

impl RecordingObserver {
    pub(crate) fn reasons(&self) -> Vec<&'static str> {
        self.reasons.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn session_ended(&self, reason: &EndReason) {
        self.reasons.lock().unwrap().push(reason.label());
    }
}

/// Session over an in-memory store, optionally seeded with `pair`. The timer
/// is not armed.
pub(crate) async fn session_with(
    backend: &Arc<FakeBackend>,
    pair: Option<TokenPair>,
    interval: Duration,
) -> (Arc<SessionManager>, Arc<RecordingObserver>) {
    let store = Arc::new(CredentialStore::in_memory());
    if let Some(pair) = pair {
        store.set_tokens(pair).await.unwrap();
    }
    let observer = Arc::new(RecordingObserver::default());
    let session = SessionManager::new(
        store,
        Arc::clone(backend) as Arc<dyn TokenRefresher>,
        Arc::clone(&observer) as Arc<dyn SessionObserver>,
        interval,
    );
    (session, observer)
}

/// Session seeded with `at_0` / `rt_0` and the default 14 minute interval.
pub(crate) async fn logged_in(
    backend: &Arc<FakeBackend>,
) -> (Arc<SessionManager>, Arc<RecordingObserver>) {
    session_with(
        backend,
        Some(TokenPair::new("at_0", "rt_0")),
        Duration::from_secs(backoffice_auth::DEFAULT_REFRESH_INTERVAL_SECS),
    )
    .await
}
