//! Append-only sync log repository.

use chrono::Utc;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{AsyncSqlitePool, DieselError};
use super::records::SyncLogRecord;
use crate::models::{SyncRun, SyncStatus, SyncTrigger, SyncType};
use crate::schema::sync_log;

/// Repository for the append-only `sync_log` table.
#[derive(Clone)]
pub struct SyncLogRepository {
    pool: AsyncSqlitePool,
}

impl SyncLogRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new run in `running` status and return its row id.
    pub async fn insert_running(
        &self,
        sync_type: SyncType,
        trigger: SyncTrigger,
        triggered_by: &str,
    ) -> Result<i32, DieselError> {
        let mut conn = self.pool.get().await?;

        let started_at = Utc::now().to_rfc3339();

        diesel::insert_into(sync_log::table)
            .values((
                sync_log::sync_type.eq(sync_type.as_str()),
                sync_log::trigger_kind.eq(trigger.as_str()),
                sync_log::status.eq(SyncStatus::Running.as_str()),
                sync_log::triggered_by.eq(triggered_by),
                sync_log::started_at.eq(&started_at),
            ))
            .execute(&mut conn)
            .await?;

        let id: Option<i32> = sync_log::table
            .filter(sync_log::status.eq(SyncStatus::Running.as_str()))
            .select(max(sync_log::id))
            .first(&mut conn)
            .await?;

        id.ok_or(DieselError::NotFound)
    }

    /// Mark a run terminal. Called exactly once per run.
    pub async fn complete(
        &self,
        id: i32,
        success: bool,
        error_message: Option<&str>,
        duration_ms: i32,
        records_processed: i32,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        let status = if success {
            SyncStatus::Success
        } else {
            SyncStatus::Failed
        };
        let completed_at = Utc::now().to_rfc3339();

        diesel::update(sync_log::table.find(id))
            .set((
                sync_log::status.eq(status.as_str()),
                sync_log::error_message.eq(error_message),
                sync_log::duration_ms.eq(Some(duration_ms)),
                sync_log::records_processed.eq(records_processed),
                sync_log::completed_at.eq(Some(&completed_at)),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Fetch a run by id.
    pub async fn get(&self, id: i32) -> Result<Option<SyncRun>, DieselError> {
        let mut conn = self.pool.get().await?;

        sync_log::table
            .find(id)
            .first::<SyncLogRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(SyncRun::from))
    }

    /// Most recent runs, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<SyncRun>, DieselError> {
        let mut conn = self.pool.get().await?;

        sync_log::table
            .order(sync_log::id.desc())
            .limit(limit)
            .load::<SyncLogRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(SyncRun::from).collect())
    }

    /// Number of runs currently in `running` status.
    pub async fn running_count(&self) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        sync_log::table
            .filter(sync_log::status.eq(SyncStatus::Running.as_str()))
            .select(count_star())
            .first(&mut conn)
            .await
    }
}
