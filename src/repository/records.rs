//! Diesel row records and conversions to domain models.
//!
//! Field order must match the column order declared in `crate::schema`.

use std::path::PathBuf;

use diesel::prelude::*;

use super::{parse_datetime, parse_datetime_opt};
use crate::models::{
    AlertLevel, CalculationDetails, CsvCacheEntry, DiseaseStat, ManualRefreshRequest, NewsAlert,
    Region, SyncRun, SyncStatus, SyncTrigger, SyncType, TrendPoint, VaccinationRecord,
    WastewaterSample,
};

#[derive(Debug, Queryable)]
pub struct CsvCacheRecord {
    pub id: i32,
    pub url: String,
    pub filename: String,
    pub local_path: String,
    pub remote_last_modified: Option<String>,
    pub remote_etag: Option<String>,
    pub local_file_hash: String,
    pub download_count: i32,
    pub last_checked: String,
    pub created_at: String,
}

impl From<CsvCacheRecord> for CsvCacheEntry {
    fn from(record: CsvCacheRecord) -> Self {
        CsvCacheEntry {
            url: record.url,
            filename: record.filename,
            local_path: PathBuf::from(record.local_path),
            remote_last_modified: record.remote_last_modified,
            remote_etag: record.remote_etag,
            local_file_hash: record.local_file_hash,
            download_count: record.download_count,
            last_checked: parse_datetime(&record.last_checked),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

#[derive(Debug, Queryable)]
pub struct SyncLogRecord {
    pub id: i32,
    pub sync_type: String,
    pub trigger_kind: String,
    pub status: String,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
    pub triggered_by: String,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl From<SyncLogRecord> for SyncRun {
    fn from(record: SyncLogRecord) -> Self {
        SyncRun {
            id: record.id,
            sync_type: SyncType::from_str(&record.sync_type).unwrap_or(SyncType::All),
            trigger: SyncTrigger::from_str(&record.trigger_kind).unwrap_or(SyncTrigger::Manual),
            status: SyncStatus::from_str(&record.status).unwrap_or(SyncStatus::Failed),
            records_processed: record.records_processed,
            error_message: record.error_message,
            duration_ms: record.duration_ms,
            triggered_by: record.triggered_by,
            started_at: parse_datetime(&record.started_at),
            completed_at: parse_datetime_opt(record.completed_at),
        }
    }
}

#[derive(Debug, Queryable)]
pub struct ManualRefreshRecord {
    pub id: i32,
    pub request_id: String,
    pub source_ip: String,
    pub user_id: Option<String>,
    pub request_time: String,
    pub scheduled_for: String,
    pub executed: i32,
    pub notification_sent: i32,
}

impl From<ManualRefreshRecord> for ManualRefreshRequest {
    fn from(record: ManualRefreshRecord) -> Self {
        ManualRefreshRequest {
            id: record.id,
            request_id: record.request_id,
            source_ip: record.source_ip,
            user_id: record.user_id,
            request_time: parse_datetime(&record.request_time),
            scheduled_for: parse_datetime(&record.scheduled_for),
            executed: record.executed != 0,
            notification_sent: record.notification_sent != 0,
        }
    }
}

#[derive(Debug, Queryable)]
pub struct VaccinationDataRecord {
    pub id: i32,
    pub region: String,
    pub vaccine_name: String,
    pub current_year: f64,
    pub five_years_ago: f64,
    pub ten_years_ago: f64,
    pub last_available_rate: Option<f64>,
    pub last_available_date: Option<String>,
    pub collection_method: Option<String>,
    pub source_url: Option<String>,
    pub calculation_details: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl VaccinationDataRecord {
    pub fn region(&self) -> Region {
        Region::from_str(&self.region).unwrap_or(Region::Nyc)
    }
}

impl From<VaccinationDataRecord> for VaccinationRecord {
    fn from(record: VaccinationDataRecord) -> Self {
        let calculation_details = record
            .calculation_details
            .as_deref()
            .and_then(|raw| serde_json::from_str::<CalculationDetails>(raw).ok());

        VaccinationRecord {
            name: record.vaccine_name,
            current_year: record.current_year,
            five_years_ago: record.five_years_ago,
            ten_years_ago: record.ten_years_ago,
            collection_method: record.collection_method,
            source_url: record.source_url,
            last_available_rate: record.last_available_rate,
            last_available_date: record.last_available_date,
            calculation_details,
        }
    }
}

#[derive(Debug, Queryable)]
pub struct DiseaseStatRecord {
    pub id: i32,
    pub name: String,
    pub current_count: i32,
    pub week_ago_count: i32,
    pub month_ago_count: i32,
    pub two_months_ago_count: i32,
    pub year_ago_count: i32,
    pub unit: String,
    pub last_updated: String,
    pub data_source: String,
    pub source_url: String,
    pub region: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<DiseaseStatRecord> for DiseaseStat {
    fn from(record: DiseaseStatRecord) -> Self {
        DiseaseStat {
            name: record.name,
            current_count: record.current_count,
            week_ago: TrendPoint::stable(record.week_ago_count),
            month_ago: TrendPoint::stable(record.month_ago_count),
            two_months_ago: TrendPoint::stable(record.two_months_ago_count),
            year_ago: TrendPoint::stable(record.year_ago_count),
            unit: record.unit,
            last_updated: record.last_updated,
            data_source: record.data_source,
            source_url: record.source_url,
            region: Region::from_str(&record.region).unwrap_or(Region::Nyc),
        }
    }
}

#[derive(Debug, Queryable)]
pub struct WastewaterDataRecord {
    pub id: i32,
    pub sample_date: String,
    pub location: String,
    pub concentration: f64,
    pub trend: String,
    pub pathogen: String,
    pub average_concentration: f64,
    pub alert_level: String,
    pub last_updated: String,
    pub pathogens: String,
    pub created_at: String,
    pub updated_at: String,
}

impl WastewaterDataRecord {
    pub fn alert_level(&self) -> AlertLevel {
        AlertLevel::from_str(&self.alert_level).unwrap_or(AlertLevel::Low)
    }

    pub fn pathogens(&self) -> Vec<String> {
        serde_json::from_str(&self.pathogens).unwrap_or_default()
    }
}

impl From<WastewaterDataRecord> for WastewaterSample {
    fn from(record: WastewaterDataRecord) -> Self {
        WastewaterSample {
            date: record.sample_date,
            location: record.location,
            concentration: record.concentration,
            trend: record.trend,
            pathogen: Some(record.pathogen),
        }
    }
}

#[derive(Debug, Queryable)]
pub struct NewsDataRecord {
    pub id: i32,
    pub alert_id: String,
    pub title: String,
    pub summary: String,
    pub date: String,
    pub severity: String,
    pub source: String,
    pub url: Option<String>,
    pub region: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<NewsDataRecord> for NewsAlert {
    fn from(record: NewsDataRecord) -> Self {
        NewsAlert {
            id: record.alert_id,
            title: record.title,
            summary: record.summary,
            date: record.date,
            severity: record.severity,
            source: record.source,
            url: record.url,
            region: Region::from_str(&record.region).unwrap_or(Region::Usa),
        }
    }
}
