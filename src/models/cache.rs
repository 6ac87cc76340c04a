//! CSV download cache models.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata describing one cached download of a remote CSV resource.
///
/// The referenced file's bytes live on disk; an entry whose file is missing
/// or whose content hash mismatches is treated as a cache miss.
#[derive(Debug, Clone)]
pub struct CsvCacheEntry {
    pub url: String,
    pub filename: String,
    pub local_path: PathBuf,
    pub remote_last_modified: Option<String>,
    pub remote_etag: Option<String>,
    pub local_file_hash: String,
    pub download_count: i32,
    pub last_checked: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of a cache lookup or download.
#[derive(Debug, Clone)]
pub struct CsvFetch {
    pub data: String,
    pub filename: String,
    pub from_cache: bool,
    pub last_modified: Option<String>,
}

/// Aggregate statistics over the CSV cache.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: i64,
    pub total_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<DateTime<Utc>>,
}
