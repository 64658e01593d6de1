//! Session manager: credential pair, single-flight refresh, refresh timer
//!
//! One `SessionManager` exists per logged-in user and is shared through an
//! `Arc`. The refresh cycle state (`refreshing` flag plus the FIFO queue of
//! waiters) sits behind a `std::sync::Mutex` that is never held across an
//! `.await`, so the check-and-set and the queue push are one atomic step.
//!
//! The network call for a refresh runs on its own task. Every caller that
//! needs the new token, including the one that started the refresh, waits on
//! a one-shot channel in the queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backoffice_auth::{CredentialStore, TokenPair, TokenRefresher, UserProfile};
use common::Secret;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::refresh::spawn_refresh_timer;

/// What every waiter receives when a refresh cycle completes.
type RefreshOutcome = std::result::Result<Secret<String>, String>;

type Waiters = VecDeque<oneshot::Sender<RefreshOutcome>>;

/// What started a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// The proactive refresh timer fired.
    Timer,
    /// A request came back 401.
    Unauthorized,
    /// Requested explicitly by the application.
    Manual,
}

impl RefreshTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshTrigger::Timer => "timer",
            RefreshTrigger::Unauthorized => "unauthorized",
            RefreshTrigger::Manual => "manual",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The user logged out.
    Logout,
    /// The refresh call failed or no refresh token was stored.
    RefreshFailed(String),
    /// A request was rejected with 401 even after replaying with a new token.
    RejectedAfterRefresh,
}

impl EndReason {
    pub fn label(&self) -> &'static str {
        match self {
            EndReason::Logout => "logout",
            EndReason::RefreshFailed(_) => "refresh_failed",
            EndReason::RejectedAfterRefresh => "rejected_after_refresh",
        }
    }

    /// Whether the user lost the session without asking to.
    pub fn is_forced(&self) -> bool {
        !matches!(self, EndReason::Logout)
    }
}

/// Notified when a session ends. Stands in for the redirect to the login
/// screen; implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn session_ended(&self, reason: &EndReason);
}

/// Result of the refresh timer trying to start a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerClaim {
    Started,
    InFlight,
    /// The session was logged out or replaced after the timer was armed.
    Stale,
}

#[derive(Default)]
struct RefreshCycle {
    refreshing: bool,
    waiters: Waiters,
    /// Bumped whenever the session ends or is replaced by a new login. A
    /// refresh only stores its pair, arms the timer and resolves waiters
    /// while the epoch it started in is still current.
    epoch: u64,
}

impl RefreshCycle {
    /// Move to a new epoch, dropping the in-flight flag and handing back
    /// everyone still queued on the old one.
    fn advance(&mut self) -> (u64, Waiters) {
        self.epoch = self.epoch.wrapping_add(1);
        self.refreshing = false;
        (self.epoch, std::mem::take(&mut self.waiters))
    }
}

/// Shared session state for one logged-in user.
pub struct SessionManager {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    observer: Arc<dyn SessionObserver>,
    refresh_interval: Duration,
    cycle: Mutex<RefreshCycle>,
    /// Serializes credential writes. Logout and login advance the epoch
    /// before taking it, so a refresh that writes first is always
    /// overwritten afterwards.
    writes: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        observer: Arc<dyn SessionObserver>,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            refresher,
            observer,
            refresh_interval,
            cycle: Mutex::new(RefreshCycle::default()),
            writes: tokio::sync::Mutex::new(()),
            timer: Mutex::new(None),
        })
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.store.access_token().await
    }

    pub async fn has_refresh_token(&self) -> bool {
        self.store.refresh_token().await.is_some()
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.store.user().await
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock_cycle().refreshing
    }

    /// Number of callers currently waiting on the in-flight refresh.
    pub fn queued_waiters(&self) -> usize {
        self.lock_cycle().waiters.len()
    }

    pub fn timer_armed(&self) -> bool {
        self.lock_timer()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.lock_cycle().epoch
    }

    /// Store a fresh pair from the login endpoint and start the refresh timer.
    ///
    /// A refresh still in flight for the previous session is abandoned and
    /// its waiters are rejected.
    pub async fn login(self: &Arc<Self>, pair: TokenPair, user: Option<UserProfile>) -> Result<()> {
        let (epoch, stale) = self.lock_cycle().advance();
        self.cancel_timer();
        resolve(stale, Err("superseded by a new login".into()));
        {
            let _writes = self.writes.lock().await;
            self.store.set_tokens(pair).await?;
            self.store.set_user(user).await?;
        }
        self.arm_timer(epoch);
        info!("session started");
        Ok(())
    }

    /// Arm the timer for a session persisted by an earlier run.
    ///
    /// Returns `false` without arming unless both tokens are stored.
    pub async fn resume(self: &Arc<Self>) -> bool {
        if self.store.tokens().await.is_none() {
            return false;
        }
        let epoch = self.epoch();
        self.arm_timer(epoch);
        debug!("resumed persisted session");
        true
    }

    /// Cancel the timer and clear stored credentials.
    pub async fn logout(&self) -> Result<()> {
        let (_, waiters) = self.lock_cycle().advance();
        self.teardown(waiters, "logged out").await?;
        metrics::record_session_end(EndReason::Logout.label());
        self.observer.session_ended(&EndReason::Logout);
        info!("logged out");
        Ok(())
    }

    /// Obtain a new access token, joining the in-flight refresh if there is
    /// one. Resolves once the new pair is stored.
    pub async fn refresh(self: &Arc<Self>, trigger: RefreshTrigger) -> Result<Secret<String>> {
        let (tx, rx) = oneshot::channel();
        let lead = {
            let mut cycle = self.lock_cycle();
            cycle.waiters.push_back(tx);
            claim(&mut cycle)
        };
        if let Some(epoch) = lead {
            self.spawn_refresh(trigger, epoch);
        } else {
            debug!(trigger = trigger.label(), "refresh in flight, queued");
        }

        match rx.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(reason)) => Err(Error::SessionExpired(reason)),
            Err(_) => Err(Error::SessionExpired(
                "refresh ended without an outcome".into(),
            )),
        }
    }

    /// Start a timer-driven refresh without waiting for it, provided the
    /// session is still the one the timer was armed for.
    pub(crate) fn begin_timer_refresh(self: &Arc<Self>, armed_at: u64) -> TimerClaim {
        let lead = {
            let mut cycle = self.lock_cycle();
            if cycle.epoch != armed_at {
                return TimerClaim::Stale;
            }
            claim(&mut cycle)
        };
        match lead {
            Some(epoch) => {
                self.spawn_refresh(RefreshTrigger::Timer, epoch);
                TimerClaim::Started
            }
            None => TimerClaim::InFlight,
        }
    }

    /// End the session after an unrecoverable authentication failure, unless
    /// the session at `epoch` already ended. Returns whether this call ended
    /// it.
    pub(crate) async fn expire_at(&self, epoch: u64, reason: EndReason) -> bool {
        let Some(waiters) = self.advance_from(epoch) else {
            return false;
        };
        self.end_session(waiters, reason).await;
        true
    }

    /// (Re)start the refresh timer for `epoch`, replacing any armed one.
    pub(crate) fn arm_timer(self: &Arc<Self>, epoch: u64) {
        let handle = spawn_refresh_timer(Arc::downgrade(self), self.refresh_interval, epoch);
        if let Some(previous) = self.lock_timer().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the refresh timer. Stored credentials are left alone.
    pub fn cancel_timer(&self) {
        if let Some(handle) = self.lock_timer().take() {
            handle.abort();
        }
    }

    /// Advance the epoch only if it is still `epoch`.
    fn advance_from(&self, epoch: u64) -> Option<Waiters> {
        let mut cycle = self.lock_cycle();
        (cycle.epoch == epoch).then(|| cycle.advance().1)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock_cycle().epoch == epoch
    }

    fn spawn_refresh(self: &Arc<Self>, trigger: RefreshTrigger, epoch: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_refresh(trigger, epoch).await;
        });
    }

    async fn run_refresh(self: Arc<Self>, trigger: RefreshTrigger, epoch: u64) {
        let outcome = self.exchange(trigger, epoch).await;
        metrics::record_refresh(trigger.label(), outcome.is_ok());

        match outcome {
            Ok(token) => {
                let Some(waiters) = self.complete(epoch) else {
                    debug!("session ended during refresh, outcome discarded");
                    return;
                };
                resolve(waiters, Ok(token));
            }
            Err(reason) => match self.advance_from(epoch) {
                Some(waiters) => {
                    self.end_session(waiters, EndReason::RefreshFailed(reason))
                        .await;
                }
                // Whoever ended the session already rejected the queue.
                None => debug!(reason = %reason, "refresh failed after session ended"),
            },
        }
    }

    /// Finish a successful refresh under the cycle lock: arms the next timer
    /// and hands back the queue. `None` once the session has moved on.
    fn complete(self: &Arc<Self>, epoch: u64) -> Option<Waiters> {
        let mut cycle = self.lock_cycle();
        if cycle.epoch != epoch {
            return None;
        }
        cycle.refreshing = false;
        self.arm_timer(epoch);
        Some(std::mem::take(&mut cycle.waiters))
    }

    /// Call the authentication endpoint and store the rotated pair.
    async fn exchange(&self, trigger: RefreshTrigger, epoch: u64) -> RefreshOutcome {
        let Some(refresh_token) = self.store.refresh_token().await else {
            warn!(trigger = trigger.label(), "no refresh token stored");
            return Err("no refresh token stored".into());
        };

        let pair = match self.refresher.refresh(refresh_token.expose()).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(trigger = trigger.label(), error = %e, "token refresh failed");
                return Err(e.to_string());
            }
        };

        let _writes = self.writes.lock().await;
        if !self.is_current(epoch) {
            debug!("session ended during refresh, discarding new tokens");
            return Err("session ended during refresh".into());
        }
        let access = pair.access_token.clone();
        if let Err(e) = self.store.set_tokens(pair).await {
            warn!(error = %e, "failed to persist refreshed tokens");
        }
        // The pair written above is cleared again by the logout now
        // waiting on `writes`.
        if !self.is_current(epoch) {
            debug!("session ended while storing refreshed tokens");
            return Err("session ended during refresh".into());
        }
        info!(trigger = trigger.label(), "token refresh succeeded");
        Ok(access)
    }

    /// Stop the timer, wipe stored credentials, then reject `waiters`.
    async fn teardown(&self, waiters: Waiters, reason: &str) -> backoffice_auth::Result<()> {
        self.cancel_timer();
        let cleared = {
            let _writes = self.writes.lock().await;
            self.store.clear().await
        };
        resolve(waiters, Err(reason.to_string()));
        cleared
    }

    async fn end_session(&self, waiters: Waiters, reason: EndReason) {
        let message = match &reason {
            EndReason::RefreshFailed(message) => message.clone(),
            other => other.label().to_string(),
        };
        if let Err(e) = self.teardown(waiters, &message).await {
            warn!(error = %e, "failed to clear stored credentials");
        }
        warn!(reason = reason.label(), "session ended, login required");
        metrics::record_session_end(reason.label());
        self.observer.session_ended(&reason);
    }

    fn lock_cycle(&self) -> MutexGuard<'_, RefreshCycle> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

/// Set the `refreshing` flag if it was clear. Returns the epoch the refresh
/// belongs to when the caller became the leader.
fn claim(cycle: &mut RefreshCycle) -> Option<u64> {
    if cycle.refreshing {
        None
    } else {
        cycle.refreshing = true;
        Some(cycle.epoch)
    }
}

fn resolve(waiters: Waiters, outcome: RefreshOutcome) {
    if waiters.is_empty() {
        return;
    }
    debug!(waiters = waiters.len(), "draining refresh queue");
    for waiter in waiters {
        // A waiter whose caller was dropped has nothing to resolve.
        let _ = waiter.send(outcome.clone());
    }
}
