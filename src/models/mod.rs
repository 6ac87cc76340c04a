//! Data models for epiwatch.

mod cache;
mod datasets;
mod refresh;
mod sync_run;

pub use cache::{CacheStats, CsvCacheEntry, CsvFetch};
pub use datasets::{
    AlertLevel, CalculationDetails, DiseaseStat, NewsAlert, NewsData, Region, TrendPoint,
    VaccinationData, VaccinationRecord, WastewaterSample, WastewaterSnapshot,
};
pub use refresh::{
    hour_window, next_hour_boundary, ManualRefreshRequest, RateLimitWindow, RefreshDecision,
};
pub use sync_run::{SyncOutcome, SyncRun, SyncStatus, SyncTrigger, SyncType};
