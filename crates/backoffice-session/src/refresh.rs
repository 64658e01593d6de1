//! Proactive refresh timer
//!
//! A single-shot task that sleeps for the refresh interval and then starts a
//! refresh so the access token rotates before it expires. The success path of
//! the refresh arms the next timer; a failed refresh ends the session and
//! nothing is rearmed. The task holds only a `Weak` reference, so it never
//! keeps a dropped session alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::manager::{SessionManager, TimerClaim};

/// Spawn a timer that fires once after `interval`. It only acts while the
/// session is still at `epoch`.
pub(crate) fn spawn_refresh_timer(
    session: Weak<SessionManager>,
    interval: Duration,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(interval).await;
        let Some(session) = session.upgrade() else {
            return;
        };
        timer_fired(&session, epoch).await;
    })
}

async fn timer_fired(session: &Arc<SessionManager>, epoch: u64) {
    if !session.has_refresh_token().await {
        debug!("refresh timer fired without a refresh token, stopping");
        return;
    }
    match session.begin_timer_refresh(epoch) {
        TimerClaim::Started => debug!("refresh timer started a refresh"),
        TimerClaim::InFlight => {
            debug!("refresh already in flight, rearming timer");
            session.arm_timer(epoch);
        }
        TimerClaim::Stale => debug!("session changed since the timer was armed, stopping"),
    }
}
