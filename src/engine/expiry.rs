use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::engine::dispatcher::RideDispatcher;

/// Periodically cancels rides whose driver accepted but never departed within
/// `accept_timeout`, returning the driver to the pool.
pub async fn run_acceptance_expiry(
    dispatcher: Arc<RideDispatcher>,
    accept_timeout: Duration,
    sweep_every: Duration,
) {
    let ttl = match ChronoDuration::from_std(accept_timeout) {
        Ok(ttl) => ttl,
        Err(err) => {
            warn!(error = %err, "acceptance expiry disabled: timeout out of range");
            return;
        }
    };

    info!(timeout_secs = accept_timeout.as_secs(), "acceptance expiry started");

    let mut ticker = interval(sweep_every.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let expired = dispatcher.expire_stale_acceptances(ttl);
        if !expired.is_empty() {
            info!(count = expired.len(), "expired unstarted rides");
        }
    }
}
