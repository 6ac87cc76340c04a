//! CSV cache metadata repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{AsyncSqlitePool, DieselError};
use super::records::CsvCacheRecord;
use super::parse_datetime;
use crate::models::CsvCacheEntry;
use crate::schema::csv_cache;

/// Repository for the `csv_cache` metadata table.
///
/// One row per URL; a changed remote generation (new Last-Modified/ETag)
/// overwrites the row in place rather than appending a duplicate.
#[derive(Clone)]
pub struct CsvCacheRepository {
    pool: AsyncSqlitePool,
}

impl CsvCacheRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Look up the cache entry for a URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<CsvCacheEntry>, DieselError> {
        let mut conn = self.pool.get().await?;

        csv_cache::table
            .filter(csv_cache::url.eq(url))
            .first::<CsvCacheRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(CsvCacheEntry::from))
    }

    /// Insert or update the entry for a URL.
    ///
    /// On conflict the row is updated in place and its download count
    /// incremented, preserving one-row-per-URL.
    pub async fn upsert(&self, entry: &CsvCacheEntry) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        let local_path = entry.local_path.display().to_string();
        let last_checked = entry.last_checked.to_rfc3339();
        let created_at = entry.created_at.to_rfc3339();

        diesel::insert_into(csv_cache::table)
            .values((
                csv_cache::url.eq(&entry.url),
                csv_cache::filename.eq(&entry.filename),
                csv_cache::local_path.eq(&local_path),
                csv_cache::remote_last_modified.eq(entry.remote_last_modified.as_deref()),
                csv_cache::remote_etag.eq(entry.remote_etag.as_deref()),
                csv_cache::local_file_hash.eq(&entry.local_file_hash),
                csv_cache::download_count.eq(1),
                csv_cache::last_checked.eq(&last_checked),
                csv_cache::created_at.eq(&created_at),
            ))
            .on_conflict(csv_cache::url)
            .do_update()
            .set((
                csv_cache::filename.eq(&entry.filename),
                csv_cache::local_path.eq(&local_path),
                csv_cache::remote_last_modified.eq(entry.remote_last_modified.as_deref()),
                csv_cache::remote_etag.eq(entry.remote_etag.as_deref()),
                csv_cache::local_file_hash.eq(&entry.local_file_hash),
                csv_cache::download_count.eq(csv_cache::download_count + 1),
                csv_cache::last_checked.eq(&last_checked),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Bump `last_checked` after a 304 revalidation.
    pub async fn touch(&self, url: &str, at: DateTime<Utc>) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::update(csv_cache::table.filter(csv_cache::url.eq(url)))
            .set(csv_cache::last_checked.eq(at.to_rfc3339()))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Entry count plus oldest/newest creation timestamps.
    pub async fn stats(
        &self,
    ) -> Result<(i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>), DieselError> {
        let mut conn = self.pool.get().await?;

        let created: Vec<String> = csv_cache::table
            .select(csv_cache::created_at)
            .order(csv_cache::created_at.asc())
            .load(&mut conn)
            .await?;

        let oldest = created.as_slice().first().map(|s| parse_datetime(s));
        let newest = created.last().map(|s| parse_datetime(s));

        Ok((created.len() as i64, oldest, newest))
    }

    /// All cached file paths (for cache clearing).
    pub async fn local_paths(&self) -> Result<Vec<String>, DieselError> {
        let mut conn = self.pool.get().await?;

        csv_cache::table
            .select(csv_cache::local_path)
            .load(&mut conn)
            .await
    }

    /// Delete all cache metadata rows.
    pub async fn clear(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::delete(csv_cache::table).execute(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use diesel_async::SimpleAsyncConnection;
    use std::path::PathBuf;
    use tempfile::tempdir;

    pub(crate) const CSV_CACHE_DDL: &str = r#"CREATE TABLE IF NOT EXISTS csv_cache (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT UNIQUE NOT NULL,
        filename TEXT NOT NULL,
        local_path TEXT NOT NULL,
        remote_last_modified TEXT,
        remote_etag TEXT,
        local_file_hash TEXT NOT NULL,
        download_count INTEGER NOT NULL DEFAULT 1,
        last_checked TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#;

    fn entry(url: &str, etag: &str, hash: &str) -> CsvCacheEntry {
        CsvCacheEntry {
            url: url.to_string(),
            filename: "abc-20250615.csv".to_string(),
            local_path: PathBuf::from("/tmp/abc-20250615.csv"),
            remote_last_modified: Some("Sun, 15 Jun 2025 12:00:00 GMT".to_string()),
            remote_etag: Some(etag.to_string()),
            local_file_hash: hash.to_string(),
            download_count: 1,
            last_checked: Utc::now(),
            created_at: Utc::now(),
        }
    }

    async fn setup_test_db() -> (AsyncSqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let pool = AsyncSqlitePool::from_path(&db_path);
        let mut conn = pool.get().await.unwrap();
        conn.batch_execute(CSV_CACHE_DDL).await.unwrap();

        (pool, dir)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let (pool, _dir) = setup_test_db().await;
        let repo = CsvCacheRepository::new(pool);

        assert!(repo.get_by_url("https://example.com/data.csv").await.unwrap().is_none());

        repo.upsert(&entry("https://example.com/data.csv", "\"abc\"", "hash1"))
            .await
            .unwrap();

        let found = repo
            .get_by_url("https://example.com/data.csv")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.remote_etag.as_deref(), Some("\"abc\""));
        assert_eq!(found.download_count, 1);
    }

    #[tokio::test]
    async fn test_upsert_new_generation_overwrites() {
        let (pool, _dir) = setup_test_db().await;
        let repo = CsvCacheRepository::new(pool);
        let url = "https://example.com/data.csv";

        repo.upsert(&entry(url, "\"abc\"", "hash1")).await.unwrap();
        // Remote content changed: new ETag and hash must replace the row,
        // not append a duplicate
        repo.upsert(&entry(url, "\"def\"", "hash2")).await.unwrap();

        let (count, _, _) = repo.stats().await.unwrap();
        assert_eq!(count, 1);

        let found = repo.get_by_url(url).await.unwrap().unwrap();
        assert_eq!(found.remote_etag.as_deref(), Some("\"def\""));
        assert_eq!(found.local_file_hash, "hash2");
        assert_eq!(found.download_count, 2);
    }

    #[tokio::test]
    async fn test_touch_bumps_last_checked() {
        let (pool, _dir) = setup_test_db().await;
        let repo = CsvCacheRepository::new(pool);
        let url = "https://example.com/data.csv";

        repo.upsert(&entry(url, "\"abc\"", "hash1")).await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(1);
        repo.touch(url, later).await.unwrap();

        let found = repo.get_by_url(url).await.unwrap().unwrap();
        assert_eq!(found.last_checked.timestamp(), later.timestamp());
        assert_eq!(found.download_count, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let (pool, _dir) = setup_test_db().await;
        let repo = CsvCacheRepository::new(pool);

        repo.upsert(&entry("https://example.com/a.csv", "\"a\"", "h1"))
            .await
            .unwrap();
        repo.upsert(&entry("https://example.com/b.csv", "\"b\"", "h2"))
            .await
            .unwrap();

        assert_eq!(repo.local_paths().await.unwrap().len(), 2);
        repo.clear().await.unwrap();
        let (count, oldest, _) = repo.stats().await.unwrap();
        assert_eq!(count, 0);
        assert!(oldest.is_none());
    }
}
