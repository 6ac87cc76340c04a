//! CSV download cache with conditional revalidation.
//!
//! Avoids re-downloading an unchanged remote CSV, serves the last known
//! good copy when the remote is unreachable, and never serves content
//! whose on-disk bytes no longer match the stored hash. Metadata lives in
//! the `csv_cache` table; file bytes live under the cache directory.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::fetch::HttpClient;
use crate::models::{CacheStats, CsvCacheEntry, CsvFetch};
use crate::repository::{CsvCacheRepository, DieselError};

/// Errors surfaced by the CSV cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Db(#[from] DieselError),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: failed to download {url}")]
    Status { url: String, status: u16 },
}

/// Compute the SHA-256 hex digest of CSV content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a collision-resistant filename traceable to the source URL.
///
/// The URL hash prefix keeps downloads of the same resource adjacent; the
/// timestamp keeps concurrent re-downloads from overwriting each other.
pub fn generate_filename(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let url_hash = hex::encode(hasher.finalize());
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    format!("{}-{}.csv", &url_hash[..16], timestamp)
}

/// Content cache for periodically-refreshed remote CSV resources.
#[derive(Clone)]
pub struct CsvCache {
    repo: CsvCacheRepository,
    http: HttpClient,
    cache_dir: PathBuf,
}

impl CsvCache {
    /// Create a cache rooted at `cache_dir`, creating the directory if needed.
    pub fn new(
        repo: CsvCacheRepository,
        http: HttpClient,
        cache_dir: &Path,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(cache_dir)?;
        Ok(Self {
            repo,
            http,
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Fetch a CSV, serving from cache when the remote reports it unchanged.
    ///
    /// With a valid cache entry the remote is revalidated with a conditional
    /// GET: 304 serves the local copy, 2xx replaces it, and anything else
    /// (network failure, unexpected status) falls back to the local copy
    /// with a warning. Without a usable entry the download is unconditional
    /// and failures propagate.
    pub async fn get_cached_csv(
        &self,
        url: &str,
        force_download: bool,
    ) -> Result<CsvFetch, CacheError> {
        if force_download {
            return self.download_fresh(url).await;
        }

        let entry = match self.repo.get_by_url(url).await? {
            Some(entry) => entry,
            None => {
                info!("CSV cache miss for {}: no cache entry", url);
                return self.download_fresh(url).await;
            }
        };

        if !entry.local_path.exists() {
            warn!("CSV cache miss for {}: cached file not found", url);
            return self.download_fresh(url).await;
        }

        if !self.verify_integrity(&entry).await {
            warn!("CSV cache miss for {}: file integrity check failed", url);
            return self.download_fresh(url).await;
        }

        match self.revalidate(url, &entry).await {
            Ok(fetch) => Ok(fetch),
            Err(e) => {
                warn!(
                    "Failed to download updated CSV from {}, using cached copy: {}",
                    url, e
                );
                self.serve_cached(&entry).await
            }
        }
    }

    /// Conditional re-fetch against a known-good cache entry.
    async fn revalidate(&self, url: &str, entry: &CsvCacheEntry) -> Result<CsvFetch, CacheError> {
        let response = self
            .http
            .get(
                url,
                entry.remote_etag.as_deref(),
                entry.remote_last_modified.as_deref(),
            )
            .await?;

        if response.is_not_modified() {
            self.repo.touch(url, Utc::now()).await?;
            return self.serve_cached(entry).await;
        }

        if !response.is_success() {
            return Err(CacheError::Status {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }

        info!("CSV content changed for {} (HTTP {})", url, response.status);
        let last_modified = response.last_modified().map(str::to_string);
        let etag = response.etag().map(str::to_string);
        let content = response.text().await?;
        self.save_downloaded(url, content, last_modified, etag).await
    }

    /// Unconditional download used for cache misses and forced refreshes.
    async fn download_fresh(&self, url: &str) -> Result<CsvFetch, CacheError> {
        let response = self.http.get(url, None, None).await?;

        if !response.is_success() {
            return Err(CacheError::Status {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }

        let last_modified = response.last_modified().map(str::to_string);
        let etag = response.etag().map(str::to_string);
        let content = response.text().await?;
        self.save_downloaded(url, content, last_modified, etag).await
    }

    /// Persist downloaded content to disk and upsert its metadata row.
    async fn save_downloaded(
        &self,
        url: &str,
        content: String,
        last_modified: Option<String>,
        etag: Option<String>,
    ) -> Result<CsvFetch, CacheError> {
        let filename = generate_filename(url);
        let local_path = self.cache_dir.join(&filename);

        tokio::fs::write(&local_path, &content).await?;

        let entry = CsvCacheEntry {
            url: url.to_string(),
            filename: filename.clone(),
            local_path,
            remote_last_modified: last_modified.clone(),
            remote_etag: etag,
            local_file_hash: content_hash(&content),
            download_count: 1,
            last_checked: Utc::now(),
            created_at: Utc::now(),
        };
        self.repo.upsert(&entry).await?;

        info!("CSV downloaded and cached: {} as {}", url, filename);

        Ok(CsvFetch {
            data: content,
            filename,
            from_cache: false,
            last_modified,
        })
    }

    /// Serve the locally stored bytes for an entry.
    async fn serve_cached(&self, entry: &CsvCacheEntry) -> Result<CsvFetch, CacheError> {
        let data = tokio::fs::read_to_string(&entry.local_path).await?;
        Ok(CsvFetch {
            data,
            filename: entry.filename.clone(),
            from_cache: true,
            last_modified: entry.remote_last_modified.clone(),
        })
    }

    /// Recompute the file hash and compare against the stored one.
    async fn verify_integrity(&self, entry: &CsvCacheEntry) -> bool {
        match tokio::fs::read_to_string(&entry.local_path).await {
            Ok(content) => content_hash(&content) == entry.local_file_hash,
            Err(_) => false,
        }
    }

    /// Aggregate cache statistics from the metadata table and cache dir.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let (total_entries, oldest_entry, newest_entry) = self.repo.stats().await?;

        let mut total_size = 0u64;
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(file) = dir.next_entry().await? {
            if let Ok(meta) = file.metadata().await {
                total_size += meta.len();
            }
        }

        Ok(CacheStats {
            total_entries,
            total_size,
            oldest_entry,
            newest_entry,
        })
    }

    /// Remove all cached files and metadata rows.
    pub async fn clear(&self) -> Result<(), CacheError> {
        for path in self.repo.local_paths().await? {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove cached file {}: {}", path, e);
            }
        }
        self.repo.clear().await?;
        info!("CSV cache cleared");
        Ok(())
    }
}
