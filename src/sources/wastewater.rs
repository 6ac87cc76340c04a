//! Wastewater surveillance adapter.
//!
//! Pulls SARS-CoV-2 concentration samples from the NY state open data
//! SODA API and derives the summary alert level from the mean
//! concentration across the snapshot.

use chrono::Utc;
use serde::Deserialize;

use super::{DataSource, SourceError};
use crate::fetch::HttpClient;
use crate::models::{AlertLevel, WastewaterSample, WastewaterSnapshot};
use crate::repository::datasets::WastewaterSummary;
use crate::repository::DatasetRepository;

const NY_WASTEWATER_API: &str = "https://health.data.ny.gov/resource/hdxs-icuh.json";

/// Mean concentration above which the snapshot is flagged high.
const HIGH_ALERT_THRESHOLD: f64 = 1000.0;

#[derive(Debug, Deserialize)]
struct WastewaterApiRecord {
    #[serde(default)]
    samplecollectdate: String,
    #[serde(default)]
    wwtpname: String,
    #[serde(default)]
    pcrtargetavgconc: String,
    #[serde(default)]
    pcrtarget: String,
}

/// Adapter for the wastewater dataset.
#[derive(Clone)]
pub struct WastewaterSource {
    http: HttpClient,
    datasets: DatasetRepository,
}

impl WastewaterSource {
    pub fn new(http: HttpClient, datasets: DatasetRepository) -> Self {
        Self { http, datasets }
    }

    /// Current wastewater snapshot.
    pub async fn get_data(&self) -> Result<WastewaterSnapshot, SourceError> {
        Ok(self.datasets.wastewater().await?)
    }

    fn normalize(records: Vec<WastewaterApiRecord>) -> Vec<WastewaterSample> {
        records
            .into_iter()
            .filter_map(|r| {
                // Rows with unparsable concentrations are dropped
                let concentration: f64 = r.pcrtargetavgconc.trim().parse().ok()?;
                let date = r
                    .samplecollectdate
                    .split('T')
                    .next()
                    .unwrap_or("")
                    .to_string();
                let pathogen = if r.pcrtarget.is_empty() {
                    "SARS-CoV-2".to_string()
                } else {
                    r.pcrtarget
                };

                Some(WastewaterSample {
                    date,
                    location: r.wwtpname,
                    concentration,
                    trend: "stable".to_string(),
                    pathogen: Some(pathogen),
                })
            })
            .collect()
    }

    fn summarize(samples: &[WastewaterSample]) -> WastewaterSummary {
        let average = samples.iter().map(|s| s.concentration).sum::<f64>()
            / (samples.len().max(1) as f64);
        let alert_level = if average > HIGH_ALERT_THRESHOLD {
            AlertLevel::High
        } else {
            AlertLevel::Low
        };

        WastewaterSummary {
            average_concentration: average,
            alert_level,
            last_updated: Utc::now().to_rfc3339(),
            pathogens: vec!["SARS-CoV-2".to_string()],
        }
    }
}

#[async_trait::async_trait]
impl DataSource for WastewaterSource {
    fn name(&self) -> &'static str {
        "wastewater"
    }

    async fn sync_data(&self) -> Result<usize, SourceError> {
        let url = format!(
            "{}?$order={}&$limit=1000",
            NY_WASTEWATER_API,
            urlencoding::encode("samplecollectdate DESC"),
        );
        let records: Vec<WastewaterApiRecord> = self.http.get_json(&url).await?;

        let samples = Self::normalize(records);
        let summary = Self::summarize(&samples);
        self.datasets.replace_wastewater(&samples, &summary).await?;

        Ok(samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, name: &str, conc: &str) -> WastewaterApiRecord {
        WastewaterApiRecord {
            samplecollectdate: date.to_string(),
            wwtpname: name.to_string(),
            pcrtargetavgconc: conc.to_string(),
            pcrtarget: String::new(),
        }
    }

    #[test]
    fn test_normalize_drops_unparsable_rows() {
        let samples = WastewaterSource::normalize(vec![
            record("2025-06-15T00:00:00", "Newtown Creek", "820.5"),
            record("2025-06-15T00:00:00", "Wards Island", "not a number"),
            record("2025-06-14T00:00:00", "Hunts Point", "1430"),
        ]);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].date, "2025-06-15");
        assert_eq!(samples[0].concentration, 820.5);
        assert_eq!(samples[0].pathogen.as_deref(), Some("SARS-CoV-2"));
    }

    #[test]
    fn test_summarize_alert_levels() {
        let low = WastewaterSource::normalize(vec![
            record("2025-06-15", "A", "100"),
            record("2025-06-15", "B", "300"),
        ]);
        assert_eq!(
            WastewaterSource::summarize(&low).alert_level,
            AlertLevel::Low
        );

        let high = WastewaterSource::normalize(vec![
            record("2025-06-15", "A", "900"),
            record("2025-06-15", "B", "1400"),
        ]);
        let summary = WastewaterSource::summarize(&high);
        assert_eq!(summary.alert_level, AlertLevel::High);
        assert_eq!(summary.average_concentration, 1150.0);
    }

    #[test]
    fn test_summarize_empty_does_not_divide_by_zero() {
        let summary = WastewaterSource::summarize(&[]);
        assert_eq!(summary.average_concentration, 0.0);
        assert_eq!(summary.alert_level, AlertLevel::Low);
    }

    #[test]
    fn test_normalize_keeps_explicit_pathogen() {
        let samples = WastewaterSource::normalize(vec![WastewaterApiRecord {
            samplecollectdate: "2025-06-15T00:00:00".to_string(),
            wwtpname: "Newtown Creek".to_string(),
            pcrtargetavgconc: "50".to_string(),
            pcrtarget: "Influenza A".to_string(),
        }]);
        assert_eq!(samples[0].pathogen.as_deref(), Some("Influenza A"));
    }
}
