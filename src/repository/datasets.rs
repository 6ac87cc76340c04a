//! Dataset store: snapshot-replace persistence for the normalized datasets.
//!
//! Writes are delete-then-insert inside a single transaction so readers
//! never observe a half-written snapshot and a mid-write failure rolls
//! back to the previous data.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{AsyncSqlitePool, DieselError};
use super::records::{
    DiseaseStatRecord, NewsDataRecord, VaccinationDataRecord, WastewaterDataRecord,
};
use crate::models::{
    AlertLevel, DiseaseStat, NewsAlert, Region, VaccinationRecord, WastewaterSample,
    WastewaterSnapshot,
};
use crate::schema::{disease_stats, news_data, vaccination_data, wastewater_data};

/// Summary fields stored on every wastewater row.
#[derive(Debug, Clone)]
pub struct WastewaterSummary {
    pub average_concentration: f64,
    pub alert_level: AlertLevel,
    pub last_updated: String,
    pub pathogens: Vec<String>,
}

/// Repository for the four normalized dataset tables.
#[derive(Clone)]
pub struct DatasetRepository {
    pool: AsyncSqlitePool,
}

impl DatasetRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Disease stats
    // ------------------------------------------------------------------

    /// Replace the full disease stats snapshot.
    pub async fn replace_disease_stats(&self, stats: &[DiseaseStat]) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let stats = stats.to_vec();
        let now = Utc::now().to_rfc3339();

        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::delete(disease_stats::table).execute(conn).await?;

                for stat in &stats {
                    diesel::insert_into(disease_stats::table)
                        .values((
                            disease_stats::name.eq(&stat.name),
                            disease_stats::current_count.eq(stat.current_count),
                            disease_stats::week_ago_count.eq(stat.week_ago.count),
                            disease_stats::month_ago_count.eq(stat.month_ago.count),
                            disease_stats::two_months_ago_count.eq(stat.two_months_ago.count),
                            disease_stats::year_ago_count.eq(stat.year_ago.count),
                            disease_stats::unit.eq(&stat.unit),
                            disease_stats::last_updated.eq(&stat.last_updated),
                            disease_stats::data_source.eq(&stat.data_source),
                            disease_stats::source_url.eq(&stat.source_url),
                            disease_stats::region.eq(stat.region.as_str()),
                            disease_stats::created_at.eq(&now),
                            disease_stats::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .await?;
                }

                Ok(())
            })
        })
        .await
    }

    /// Current disease stats for a region.
    pub async fn disease_stats(&self, region: Region) -> Result<Vec<DiseaseStat>, DieselError> {
        let mut conn = self.pool.get().await?;

        disease_stats::table
            .filter(disease_stats::region.eq(region.as_str()))
            .load::<DiseaseStatRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(DiseaseStat::from).collect())
    }

    // ------------------------------------------------------------------
    // Wastewater
    // ------------------------------------------------------------------

    /// Replace the full wastewater snapshot.
    pub async fn replace_wastewater(
        &self,
        samples: &[WastewaterSample],
        summary: &WastewaterSummary,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let samples = samples.to_vec();
        let summary = summary.clone();
        let pathogens_json =
            serde_json::to_string(&summary.pathogens).unwrap_or_else(|_| "[]".to_string());
        let now = Utc::now().to_rfc3339();

        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::delete(wastewater_data::table).execute(conn).await?;

                for sample in &samples {
                    diesel::insert_into(wastewater_data::table)
                        .values((
                            wastewater_data::sample_date.eq(&sample.date),
                            wastewater_data::location.eq(&sample.location),
                            wastewater_data::concentration.eq(sample.concentration),
                            wastewater_data::trend.eq(&sample.trend),
                            wastewater_data::pathogen
                                .eq(sample.pathogen.as_deref().unwrap_or("SARS-CoV-2")),
                            wastewater_data::average_concentration
                                .eq(summary.average_concentration),
                            wastewater_data::alert_level.eq(summary.alert_level.as_str()),
                            wastewater_data::last_updated.eq(&summary.last_updated),
                            wastewater_data::pathogens.eq(&pathogens_json),
                            wastewater_data::created_at.eq(&now),
                            wastewater_data::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .await?;
                }

                Ok(())
            })
        })
        .await
    }

    /// Current wastewater snapshot; an empty default when nothing is stored.
    pub async fn wastewater(&self) -> Result<WastewaterSnapshot, DieselError> {
        let mut conn = self.pool.get().await?;

        let mut records: Vec<WastewaterDataRecord> = wastewater_data::table
            .order(wastewater_data::sample_date.desc())
            .load(&mut conn)
            .await?;

        let Some(first) = records.as_slice().first() else {
            return Ok(WastewaterSnapshot::empty(Utc::now()));
        };

        let average_concentration = first.average_concentration;
        let alert_level = first.alert_level();
        let last_updated = first.last_updated.clone();
        let pathogens = first.pathogens();

        // Samples are served oldest-first
        records.reverse();
        let samples = records.into_iter().map(WastewaterSample::from).collect();

        Ok(WastewaterSnapshot {
            samples,
            average_concentration,
            trend: "stable".to_string(),
            alert_level,
            last_updated,
            pathogens,
        })
    }

    // ------------------------------------------------------------------
    // Vaccination
    // ------------------------------------------------------------------

    /// Replace the vaccination snapshot for one region scope.
    pub async fn replace_vaccination(
        &self,
        region: Region,
        records: &[VaccinationRecord],
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let records = records.to_vec();
        let now = Utc::now().to_rfc3339();

        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::delete(
                    vaccination_data::table.filter(vaccination_data::region.eq(region.as_str())),
                )
                .execute(conn)
                .await?;

                for record in &records {
                    let details = record
                        .calculation_details
                        .as_ref()
                        .and_then(|d| serde_json::to_string(d).ok());

                    diesel::insert_into(vaccination_data::table)
                        .values((
                            vaccination_data::region.eq(region.as_str()),
                            vaccination_data::vaccine_name.eq(&record.name),
                            vaccination_data::current_year.eq(record.current_year),
                            vaccination_data::five_years_ago.eq(record.five_years_ago),
                            vaccination_data::ten_years_ago.eq(record.ten_years_ago),
                            vaccination_data::last_available_rate.eq(record.last_available_rate),
                            vaccination_data::last_available_date
                                .eq(record.last_available_date.as_deref()),
                            vaccination_data::collection_method
                                .eq(record.collection_method.as_deref()),
                            vaccination_data::source_url.eq(record.source_url.as_deref()),
                            vaccination_data::calculation_details.eq(details),
                            vaccination_data::created_at.eq(&now),
                            vaccination_data::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .await?;
                }

                Ok(())
            })
        })
        .await
    }

    /// All vaccination records with their regions.
    pub async fn vaccination_records(
        &self,
    ) -> Result<Vec<(Region, VaccinationRecord)>, DieselError> {
        let mut conn = self.pool.get().await?;

        let records: Vec<VaccinationDataRecord> =
            vaccination_data::table.load(&mut conn).await?;

        Ok(records
            .into_iter()
            .map(|r| (r.region(), VaccinationRecord::from(r)))
            .collect())
    }

    // ------------------------------------------------------------------
    // News
    // ------------------------------------------------------------------

    /// Replace the full news snapshot.
    pub async fn replace_news(&self, alerts: &[NewsAlert]) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let alerts = alerts.to_vec();
        let now = Utc::now().to_rfc3339();

        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::delete(news_data::table).execute(conn).await?;

                for alert in &alerts {
                    diesel::insert_into(news_data::table)
                        .values((
                            news_data::alert_id.eq(&alert.id),
                            news_data::title.eq(&alert.title),
                            news_data::summary.eq(&alert.summary),
                            news_data::date.eq(&alert.date),
                            news_data::severity.eq(&alert.severity),
                            news_data::source.eq(&alert.source),
                            news_data::url.eq(alert.url.as_deref()),
                            news_data::region.eq(alert.region.as_str()),
                            news_data::created_at.eq(&now),
                            news_data::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .await?;
                }

                Ok(())
            })
        })
        .await
    }

    /// All news alerts, newest first by date string.
    pub async fn news_alerts(&self) -> Result<Vec<NewsAlert>, DieselError> {
        let mut conn = self.pool.get().await?;

        news_data::table
            .order(news_data::date.desc())
            .load::<NewsDataRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(NewsAlert::from).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::TrendPoint;
    use diesel_async::SimpleAsyncConnection;
    use tempfile::tempdir;

    pub(crate) const DATASET_DDL: &str = r#"CREATE TABLE IF NOT EXISTS vaccination_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        region TEXT NOT NULL,
        vaccine_name TEXT NOT NULL,
        current_year REAL NOT NULL DEFAULT 0,
        five_years_ago REAL NOT NULL DEFAULT 0,
        ten_years_ago REAL NOT NULL DEFAULT 0,
        last_available_rate REAL,
        last_available_date TEXT,
        collection_method TEXT,
        source_url TEXT,
        calculation_details TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS disease_stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        current_count INTEGER NOT NULL DEFAULT 0,
        week_ago_count INTEGER NOT NULL DEFAULT 0,
        month_ago_count INTEGER NOT NULL DEFAULT 0,
        two_months_ago_count INTEGER NOT NULL DEFAULT 0,
        year_ago_count INTEGER NOT NULL DEFAULT 0,
        unit TEXT NOT NULL,
        last_updated TEXT NOT NULL,
        data_source TEXT NOT NULL,
        source_url TEXT NOT NULL,
        region TEXT NOT NULL DEFAULT 'nyc',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS wastewater_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sample_date TEXT NOT NULL,
        location TEXT NOT NULL,
        concentration REAL NOT NULL DEFAULT 0,
        trend TEXT NOT NULL,
        pathogen TEXT NOT NULL,
        average_concentration REAL NOT NULL DEFAULT 0,
        alert_level TEXT NOT NULL,
        last_updated TEXT NOT NULL,
        pathogens TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS news_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        alert_id TEXT UNIQUE NOT NULL,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        date TEXT NOT NULL,
        severity TEXT NOT NULL,
        source TEXT NOT NULL,
        url TEXT,
        region TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#;

    pub(crate) async fn setup_test_db() -> (AsyncSqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let pool = AsyncSqlitePool::from_path(&db_path);
        let mut conn = pool.get().await.unwrap();
        conn.batch_execute(DATASET_DDL).await.unwrap();

        (pool, dir)
    }

    fn stat(name: &str, count: i32) -> DiseaseStat {
        DiseaseStat {
            name: name.to_string(),
            current_count: count,
            week_ago: TrendPoint::stable(0),
            month_ago: TrendPoint::stable(0),
            two_months_ago: TrendPoint::stable(0),
            year_ago: TrendPoint::stable(0),
            unit: "cases (YTD)".to_string(),
            last_updated: "2025-06-15".to_string(),
            data_source: "CDC NNDSS".to_string(),
            source_url: "https://data.cdc.gov".to_string(),
            region: Region::Nyc,
        }
    }

    #[tokio::test]
    async fn test_disease_snapshot_replace() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DatasetRepository::new(pool);

        repo.replace_disease_stats(&[stat("Measles", 3), stat("Pertussis", 40)])
            .await
            .unwrap();
        assert_eq!(repo.disease_stats(Region::Nyc).await.unwrap().len(), 2);

        // A second sync replaces, never appends
        repo.replace_disease_stats(&[stat("Measles", 5)]).await.unwrap();
        let stats = repo.disease_stats(Region::Nyc).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].current_count, 5);
    }

    #[tokio::test]
    async fn test_wastewater_snapshot_roundtrip() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DatasetRepository::new(pool);

        let samples = vec![
            WastewaterSample {
                date: "2025-06-14".to_string(),
                location: "Newtown Creek".to_string(),
                concentration: 820.0,
                trend: "stable".to_string(),
                pathogen: Some("SARS-CoV-2".to_string()),
            },
            WastewaterSample {
                date: "2025-06-15".to_string(),
                location: "Wards Island".to_string(),
                concentration: 1430.0,
                trend: "stable".to_string(),
                pathogen: Some("SARS-CoV-2".to_string()),
            },
        ];
        let summary = WastewaterSummary {
            average_concentration: 1125.0,
            alert_level: AlertLevel::High,
            last_updated: "2025-06-15T12:00:00Z".to_string(),
            pathogens: vec!["SARS-CoV-2".to_string()],
        };

        repo.replace_wastewater(&samples, &summary).await.unwrap();

        let snapshot = repo.wastewater().await.unwrap();
        assert_eq!(snapshot.samples.len(), 2);
        // Oldest first
        assert_eq!(snapshot.samples[0].date, "2025-06-14");
        assert_eq!(snapshot.average_concentration, 1125.0);
        assert_eq!(snapshot.alert_level, AlertLevel::High);
        assert_eq!(snapshot.pathogens, vec!["SARS-CoV-2".to_string()]);
    }

    #[tokio::test]
    async fn test_wastewater_empty_default() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DatasetRepository::new(pool);

        let snapshot = repo.wastewater().await.unwrap();
        assert!(snapshot.samples.is_empty());
        assert_eq!(snapshot.alert_level, AlertLevel::Low);
    }

    #[tokio::test]
    async fn test_vaccination_replace_scoped_by_region() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DatasetRepository::new(pool);

        let nyc_record = VaccinationRecord {
            name: "MMR (Measles, Mumps, Rubella)".to_string(),
            current_year: 91.2,
            five_years_ago: -1.0,
            ten_years_ago: -1.0,
            collection_method: None,
            source_url: None,
            last_available_rate: Some(91.2),
            last_available_date: Some("2025 Q2".to_string()),
            calculation_details: None,
        };
        let nys_record = VaccinationRecord {
            name: "Influenza (Seasonal Doses)".to_string(),
            current_year: 0.0,
            five_years_ago: -1.0,
            ten_years_ago: -1.0,
            collection_method: None,
            source_url: None,
            last_available_rate: Some(4_200_000.0),
            last_available_date: None,
            calculation_details: None,
        };

        repo.replace_vaccination(Region::Nyc, std::slice::from_ref(&nyc_record))
            .await
            .unwrap();
        repo.replace_vaccination(Region::Nys, std::slice::from_ref(&nys_record))
            .await
            .unwrap();

        // Replacing NYC leaves NYS untouched
        repo.replace_vaccination(Region::Nyc, &[]).await.unwrap();

        let records = repo.vaccination_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, Region::Nys);
    }

    #[tokio::test]
    async fn test_news_roundtrip() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DatasetRepository::new(pool);

        let alerts = vec![NewsAlert {
            id: "cdc-0".to_string(),
            title: "Health Advisory".to_string(),
            summary: "Advisory summary".to_string(),
            date: "2025-06-15".to_string(),
            severity: "info".to_string(),
            source: "CDC Health Alert Network".to_string(),
            url: Some("https://tools.cdc.gov/alert".to_string()),
            region: Region::Usa,
        }];

        repo.replace_news(&alerts).await.unwrap();
        let loaded = repo.news_alerts().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "cdc-0");
        assert_eq!(loaded[0].region, Region::Usa);
    }
}
