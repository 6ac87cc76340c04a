//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking
//! over an async SQLite connection.

pub mod csv_cache;
pub mod datasets;
pub mod migrations;
pub mod pool;
pub mod records;
pub mod refresh;
pub mod sync_log;

pub use csv_cache::CsvCacheRepository;
pub use datasets::DatasetRepository;
pub use migrations::run_migrations;
pub use pool::{AsyncSqliteConnection, AsyncSqlitePool, DieselError};
pub use refresh::{ManualRefreshRepository, RateLimitRepository};
pub use sync_log::SyncLogRepository;

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
