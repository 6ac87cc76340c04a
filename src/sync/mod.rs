//! Sync orchestrator.
//!
//! Coordinates when datasets refresh: one daily scheduled pass, manual
//! refresh requests throttled per source IP, and replay of buffered
//! requests once their deferral window elapses. A process-wide atomic
//! flag guarantees at most one sync runs at a time; a second invocation
//! is rejected with a structured result, never queued.

mod schedule;

pub use schedule::{spawn_buffer_sweep, spawn_daily_sync, time_until_next_run};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::models::{ManualRefreshRequest, RefreshDecision, SyncOutcome, SyncTrigger, SyncType};
use crate::repository::{
    DieselError, ManualRefreshRepository, RateLimitRepository, SyncLogRepository,
};
use crate::sources::DataSource;

/// Throttling and scheduling knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub max_per_hour: u32,
    pub admin_bypass_rate_limit: bool,
    pub buffer_immediate_first_request: bool,
    pub schedule_time: NaiveTime,
    pub timezone: Tz,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_per_hour: 3,
            admin_bypass_rate_limit: true,
            buffer_immediate_first_request: true,
            schedule_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: chrono_tz::America::New_York,
        }
    }
}

/// Clears the syncing flag even if a sync pass unwinds early.
struct SyncingGuard(Arc<AtomicBool>);

impl Drop for SyncingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The sync orchestrator. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct SyncService {
    syncing: Arc<AtomicBool>,
    sources: Arc<Vec<Arc<dyn DataSource>>>,
    sync_log: SyncLogRepository,
    refreshes: ManualRefreshRepository,
    rate_limits: RateLimitRepository,
    policy: SyncPolicy,
}

impl SyncService {
    pub fn new(
        sources: Vec<Arc<dyn DataSource>>,
        sync_log: SyncLogRepository,
        refreshes: ManualRefreshRepository,
        rate_limits: RateLimitRepository,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            syncing: Arc::new(AtomicBool::new(false)),
            sources: Arc::new(sources),
            sync_log,
            refreshes,
            rate_limits,
            policy,
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Whether a sync pass is currently running.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Run one full sync across all sources.
    ///
    /// Rejected immediately when a sync is already in flight. All source
    /// adapters run concurrently; one adapter's failure is collected into
    /// the error list without disturbing the others. A terminal sync_log
    /// row is always written, and the syncing flag is always released.
    pub async fn run_full_sync(&self, trigger: SyncTrigger, triggered_by: &str) -> SyncOutcome {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Sync already in progress, skipping");
            return SyncOutcome::rejected();
        }
        let _guard = SyncingGuard(self.syncing.clone());

        let started = Instant::now();
        info!(
            trigger = trigger.as_str(),
            triggered_by, "Starting full sync"
        );

        let run_id = match self
            .sync_log
            .insert_running(SyncType::All, trigger, triggered_by)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                // The sync still proceeds; only observability is degraded
                error!("Failed to record sync start: {}", e);
                None
            }
        };

        let tasks = self.sources.iter().map(|source| {
            let source = source.clone();
            async move { (source.name(), source.sync_data().await) }
        });
        let results = join_all(tasks).await;

        let mut errors = Vec::new();
        let mut records_processed = 0usize;
        for (name, result) in results {
            match result {
                Ok(records) => records_processed += records,
                Err(e) => errors.push(format!("{}: {}", name, e)),
            }
        }

        let success = errors.is_empty();
        let duration_ms = started.elapsed().as_millis() as i32;

        if let Some(id) = run_id {
            let error_message = if success {
                None
            } else {
                Some(errors.join("; "))
            };
            if let Err(e) = self
                .sync_log
                .complete(
                    id,
                    success,
                    error_message.as_deref(),
                    duration_ms,
                    records_processed as i32,
                )
                .await
            {
                error!("Failed to record sync completion: {}", e);
            }
        }

        if success {
            info!(
                trigger = trigger.as_str(),
                duration_ms, records_processed, "Sync complete"
            );
        } else {
            error!(
                trigger = trigger.as_str(),
                duration_ms,
                errors = %errors.join("; "),
                "Sync finished with errors"
            );
        }

        SyncOutcome { success, errors }
    }

    /// Decide how to handle a manual refresh request.
    ///
    /// Admission only: an accepted request spawns the sync in the
    /// background and returns without awaiting its completion.
    pub async fn request_manual_refresh(
        &self,
        source_ip: &str,
        is_admin: bool,
    ) -> Result<RefreshDecision, DieselError> {
        self.request_manual_refresh_at(source_ip, is_admin, Utc::now())
            .await
    }

    /// Admission decision against an explicit clock (for tests).
    pub async fn request_manual_refresh_at(
        &self,
        source_ip: &str,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> Result<RefreshDecision, DieselError> {
        if is_admin && self.policy.admin_bypass_rate_limit {
            self.spawn_sync(format!("admin:{}", source_ip));
            return Ok(RefreshDecision::scheduled(
                "Admin refresh started immediately",
            ));
        }

        if self.check_rate_limit(source_ip, now).await? {
            self.rate_limits.record(source_ip, now).await?;
            self.spawn_sync(format!("user:{}", source_ip));
            return Ok(RefreshDecision::scheduled("Refresh started"));
        }

        let request = ManualRefreshRequest::new(source_ip, now);
        if self.refreshes.buffer(&request).await? {
            return Ok(RefreshDecision::buffered(request.scheduled_for));
        }

        Ok(RefreshDecision::rejected())
    }

    /// Rate limit check for the hour window containing `now`.
    ///
    /// The first request of a quiet hour is always admitted when the
    /// buffer-first-request policy is on, so an idle IP is never starved
    /// into the buffer.
    async fn check_rate_limit(
        &self,
        source_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        let count = self.rate_limits.count(source_ip, now).await?;

        if count < self.policy.max_per_hour as i32 {
            return Ok(true);
        }

        if self.policy.buffer_immediate_first_request && count == 0 {
            return Ok(true);
        }

        Ok(false)
    }

    /// Replay buffered requests whose deferral window has elapsed.
    ///
    /// All due requests are amortized into a single sync pass, then marked
    /// executed and notified.
    pub async fn process_buffered_requests(&self) -> Result<usize, DieselError> {
        self.process_buffered_requests_at(Utc::now()).await
    }

    /// Buffered-request sweep against an explicit clock (for tests).
    pub async fn process_buffered_requests_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, DieselError> {
        let pending = self.refreshes.due(now).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        info!("Processing {} buffered refresh requests", pending.len());
        self.run_full_sync(SyncTrigger::Buffered, "system:buffer_processor")
            .await;

        let ids: Vec<i32> = pending.iter().map(|r| r.id).collect();
        self.refreshes.mark_executed(&ids).await?;

        Ok(pending.len())
    }

    /// Fire-and-forget a manual sync; the caller only waits for admission.
    fn spawn_sync(&self, triggered_by: String) {
        let service = self.clone();
        tokio::spawn(async move {
            service
                .run_full_sync(SyncTrigger::Manual, &triggered_by)
                .await;
        });
    }
}
