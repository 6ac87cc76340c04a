//! Manual refresh buffering and rate limit tracking repositories.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{AsyncSqlitePool, DieselError};
use super::records::ManualRefreshRecord;
use crate::models::{hour_window, ManualRefreshRequest};
use crate::schema::{manual_refresh_requests, rate_limit_tracking};

/// Repository for buffered manual refresh requests.
#[derive(Clone)]
pub struct ManualRefreshRepository {
    pool: AsyncSqlitePool,
}

impl ManualRefreshRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// The un-executed request for an IP, if one exists.
    pub async fn pending_for_ip(
        &self,
        source_ip: &str,
    ) -> Result<Option<ManualRefreshRequest>, DieselError> {
        let mut conn = self.pool.get().await?;

        manual_refresh_requests::table
            .filter(manual_refresh_requests::source_ip.eq(source_ip))
            .filter(manual_refresh_requests::executed.eq(0))
            .first::<ManualRefreshRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(ManualRefreshRequest::from))
    }

    /// Insert a buffered request. Returns false without inserting when an
    /// un-executed request already exists for the IP (dedup invariant).
    pub async fn buffer(&self, request: &ManualRefreshRequest) -> Result<bool, DieselError> {
        if self.pending_for_ip(&request.source_ip).await?.is_some() {
            return Ok(false);
        }

        let mut conn = self.pool.get().await?;

        diesel::insert_into(manual_refresh_requests::table)
            .values((
                manual_refresh_requests::request_id.eq(&request.request_id),
                manual_refresh_requests::source_ip.eq(&request.source_ip),
                manual_refresh_requests::user_id.eq(request.user_id.as_deref()),
                manual_refresh_requests::request_time.eq(request.request_time.to_rfc3339()),
                manual_refresh_requests::scheduled_for.eq(request.scheduled_for.to_rfc3339()),
                manual_refresh_requests::executed.eq(0),
                manual_refresh_requests::notification_sent.eq(0),
            ))
            .execute(&mut conn)
            .await?;

        Ok(true)
    }

    /// All un-executed requests whose scheduled time has passed.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ManualRefreshRequest>, DieselError> {
        let mut conn = self.pool.get().await?;

        manual_refresh_requests::table
            .filter(manual_refresh_requests::executed.eq(0))
            .filter(manual_refresh_requests::scheduled_for.le(now.to_rfc3339()))
            .load::<ManualRefreshRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(ManualRefreshRequest::from).collect())
    }

    /// Mark a batch of swept requests executed and notified.
    pub async fn mark_executed(&self, ids: &[i32]) -> Result<(), DieselError> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get().await?;

        diesel::update(
            manual_refresh_requests::table.filter(manual_refresh_requests::id.eq_any(ids)),
        )
        .set((
            manual_refresh_requests::executed.eq(1),
            manual_refresh_requests::notification_sent.eq(1),
        ))
        .execute(&mut conn)
        .await?;

        Ok(())
    }
}

/// Repository for per-IP hourly request counters.
#[derive(Clone)]
pub struct RateLimitRepository {
    pool: AsyncSqlitePool,
}

impl RateLimitRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Request count for an IP in the hour window containing `at`.
    pub async fn count(&self, source_ip: &str, at: DateTime<Utc>) -> Result<i32, DieselError> {
        let mut conn = self.pool.get().await?;
        let window = hour_window(at).to_rfc3339();

        let count: Option<i32> = rate_limit_tracking::table
            .filter(rate_limit_tracking::hour_window.eq(&window))
            .filter(rate_limit_tracking::source_ip.eq(source_ip))
            .select(rate_limit_tracking::request_count)
            .first(&mut conn)
            .await
            .optional()?;

        Ok(count.unwrap_or(0))
    }

    /// Record one accepted request against the window containing `at`.
    pub async fn record(&self, source_ip: &str, at: DateTime<Utc>) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let window = hour_window(at).to_rfc3339();
        let now = at.to_rfc3339();

        diesel::insert_into(rate_limit_tracking::table)
            .values((
                rate_limit_tracking::hour_window.eq(&window),
                rate_limit_tracking::source_ip.eq(source_ip),
                rate_limit_tracking::request_count.eq(1),
                rate_limit_tracking::last_request_time.eq(&now),
            ))
            .on_conflict((
                rate_limit_tracking::hour_window,
                rate_limit_tracking::source_ip,
            ))
            .do_update()
            .set((
                rate_limit_tracking::request_count.eq(rate_limit_tracking::request_count + 1),
                rate_limit_tracking::last_request_time.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Delete windows older than `before`. Housekeeping only.
    pub async fn prune(&self, before: DateTime<Utc>) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::delete(
            rate_limit_tracking::table
                .filter(rate_limit_tracking::hour_window.lt(before.to_rfc3339())),
        )
        .execute(&mut conn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use diesel_async::SimpleAsyncConnection;
    use tempfile::tempdir;

    async fn setup_test_db() -> (AsyncSqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let pool = AsyncSqlitePool::from_path(&db_path);
        let mut conn = pool.get().await.unwrap();
        conn.batch_execute(
            r#"CREATE TABLE IF NOT EXISTS manual_refresh_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT UNIQUE NOT NULL,
                source_ip TEXT NOT NULL,
                user_id TEXT,
                request_time TEXT NOT NULL,
                scheduled_for TEXT NOT NULL,
                executed INTEGER NOT NULL DEFAULT 0,
                notification_sent INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS rate_limit_tracking (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hour_window TEXT NOT NULL,
                source_ip TEXT NOT NULL,
                request_count INTEGER NOT NULL DEFAULT 1,
                last_request_time TEXT NOT NULL,
                UNIQUE(hour_window, source_ip)
            );"#,
        )
        .await
        .unwrap();

        (pool, dir)
    }

    #[tokio::test]
    async fn test_buffer_dedup_per_ip() {
        let (pool, _dir) = setup_test_db().await;
        let repo = ManualRefreshRepository::new(pool);
        let now = Utc::now();

        let first = ManualRefreshRequest::new("1.2.3.4", now);
        assert!(repo.buffer(&first).await.unwrap());

        // A second un-executed request for the same IP is refused
        let second = ManualRefreshRequest::new("1.2.3.4", now);
        assert!(!repo.buffer(&second).await.unwrap());

        // A different IP is unaffected
        let other = ManualRefreshRequest::new("5.6.7.8", now);
        assert!(repo.buffer(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_due_and_mark_executed() {
        let (pool, _dir) = setup_test_db().await;
        let repo = ManualRefreshRepository::new(pool);

        let past = Utc.with_ymd_and_hms(2025, 6, 15, 13, 30, 0).unwrap();
        let request = ManualRefreshRequest::new("1.2.3.4", past);
        repo.buffer(&request).await.unwrap();

        // Not yet due right after the request
        let due = repo.due(past).await.unwrap();
        assert!(due.is_empty());

        // Due once the scheduled hour boundary has passed
        let later = Utc.with_ymd_and_hms(2025, 6, 15, 14, 5, 0).unwrap();
        let due = repo.due(later).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].source_ip, "1.2.3.4");

        repo.mark_executed(&[due[0].id]).await.unwrap();
        assert!(repo.due(later).await.unwrap().is_empty());
        assert!(repo.pending_for_ip("1.2.3.4").await.unwrap().is_none());

        // Executed request no longer blocks a new buffer
        let again = ManualRefreshRequest::new("1.2.3.4", later);
        assert!(repo.buffer(&again).await.unwrap());
    }

    #[tokio::test]
    async fn test_rate_limit_counts_per_window() {
        let (pool, _dir) = setup_test_db().await;
        let repo = RateLimitRepository::new(pool);

        let at = Utc.with_ymd_and_hms(2025, 6, 15, 14, 10, 0).unwrap();
        assert_eq!(repo.count("1.2.3.4", at).await.unwrap(), 0);

        repo.record("1.2.3.4", at).await.unwrap();
        let later_same_hour = Utc.with_ymd_and_hms(2025, 6, 15, 14, 45, 0).unwrap();
        repo.record("1.2.3.4", later_same_hour).await.unwrap();

        assert_eq!(repo.count("1.2.3.4", later_same_hour).await.unwrap(), 2);

        // A new hour starts a fresh window
        let next_hour = Utc.with_ymd_and_hms(2025, 6, 15, 15, 1, 0).unwrap();
        assert_eq!(repo.count("1.2.3.4", next_hour).await.unwrap(), 0);

        // Other IPs are independent
        assert_eq!(repo.count("5.6.7.8", at).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_old_windows() {
        let (pool, _dir) = setup_test_db().await;
        let repo = RateLimitRepository::new(pool);

        let old = Utc.with_ymd_and_hms(2025, 6, 14, 9, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2025, 6, 15, 14, 0, 0).unwrap();
        repo.record("1.2.3.4", old).await.unwrap();
        repo.record("1.2.3.4", recent).await.unwrap();

        let removed = repo
            .prune(Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.count("1.2.3.4", recent).await.unwrap(), 1);
    }
}
