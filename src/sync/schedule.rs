//! Daily sync scheduling.
//!
//! Computes the next wall-clock occurrence of the configured HH:MM in the
//! configured time zone and sleeps until then. A tick that lands while a
//! sync is already running is rejected by the orchestrator and lost, not
//! retried.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tracing::info;

use super::SyncService;
use crate::models::SyncTrigger;

/// Interval between buffered-request sweeps after the startup sweep.
const BUFFER_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Duration until the next occurrence of `at` in `tz`, seen from `now`.
pub fn time_until_next_run(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> Duration {
    let local_now = now.with_timezone(&tz);
    let today = local_now.date_naive().and_time(at);

    let target = match tz.from_local_datetime(&today).earliest() {
        Some(target) if target > local_now => target,
        // Today's slot has passed (or is invalid due to a DST gap); take
        // tomorrow's
        _ => {
            let tomorrow = today.date().succ_opt().unwrap_or(today.date()).and_time(at);
            match tz.from_local_datetime(&tomorrow).earliest() {
                Some(target) => target,
                None => return Duration::from_secs(24 * 60 * 60),
            }
        }
    };

    (target.with_timezone(&Utc) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Spawn the daily sync loop.
pub fn spawn_daily_sync(service: SyncService) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = time_until_next_run(
                Utc::now(),
                service.policy().schedule_time,
                service.policy().timezone,
            );
            info!("Next scheduled sync in {}s", wait.as_secs());
            tokio::time::sleep(wait).await;

            info!("Starting scheduled daily sync");
            service.run_full_sync(SyncTrigger::Scheduled, "system").await;
        }
    })
}

/// Spawn the periodic buffered-request sweep.
///
/// The caller is expected to run one sweep at startup; this keeps
/// replaying requests whose window elapses while the process stays up.
pub fn spawn_buffer_sweep(service: SyncService) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(BUFFER_SWEEP_INTERVAL);
        // The immediate first tick duplicates the startup sweep; skip it
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = service.process_buffered_requests().await {
                tracing::error!("Buffered request sweep failed: {}", e);
            }
        }
    })
}
