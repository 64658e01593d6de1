//! Session metrics
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! whether an exporter is installed. Without one these calls are no-ops.
//!
//! - `session_refresh_total` (counter): labels `trigger`, `outcome`
//! - `session_requests_total` (counter): label `status`
//! - `session_replays_total` (counter): label `reason`
//! - `session_logouts_total` (counter): label `reason`

/// Record a completed refresh attempt.
pub fn record_refresh(trigger: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!("session_refresh_total", "trigger" => trigger, "outcome" => outcome)
        .increment(1);
}

/// Record the final status delivered to a caller.
pub fn record_request(status: u16) {
    ::metrics::counter!("session_requests_total", "status" => status.to_string()).increment(1);
}

/// Record a replay of a request that hit a 401.
pub fn record_replay(reason: &'static str) {
    ::metrics::counter!("session_replays_total", "reason" => reason).increment(1);
}

/// Record the end of a session.
pub fn record_session_end(reason: &'static str) {
    ::metrics::counter!("session_logouts_total", "reason" => reason).increment(1);
}
