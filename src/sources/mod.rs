//! Source adapters: one per upstream dataset.
//!
//! Each adapter fetches from its upstream, normalizes into the internal
//! record shapes, and snapshot-replaces its dataset tables. Failures stay
//! inside the adapter's boundary: the orchestrator receives at most one
//! labeled error per source and sibling adapters are unaffected.

mod disease;
mod news;
mod vaccination;
mod wastewater;

pub use disease::DiseaseSource;
pub use news::NewsSource;
pub use vaccination::VaccinationSource;
pub use wastewater::WastewaterSource;

use async_trait::async_trait;

use crate::csvcache::CacheError;
use crate::fetch::FetchError;
use crate::repository::DieselError;

/// Error from one adapter's sync pass.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Db(#[from] DieselError),
    #[error("{0}")]
    Parse(String),
}

/// A source adapter that can refresh its dataset.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name used to label errors and log lines.
    fn name(&self) -> &'static str;

    /// Fetch, normalize, and snapshot-replace this source's dataset.
    /// Returns the number of records written.
    async fn sync_data(&self) -> Result<usize, SourceError>;
}

/// Parse a numeric string that may contain thousands separators.
/// Malformed values count as zero rather than failing the sync.
pub(crate) fn parse_lenient_f64(raw: &str) -> f64 {
    raw.replace(',', "").trim().parse().unwrap_or(0.0)
}

/// Parse an integer string, treating placeholders like "-" as zero.
pub(crate) fn parse_lenient_i32(raw: &str) -> i32 {
    raw.replace(',', "").trim().parse().unwrap_or(0)
}
