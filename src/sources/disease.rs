//! Disease surveillance adapter.
//!
//! Merges three upstreams into one normalized stats snapshot: CDC NNDSS
//! weekly counts for the New York area, NYC Open Data daily COVID counts,
//! and Delphi ILINet outpatient influenza visits.

use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

use super::{parse_lenient_i32, DataSource, SourceError};
use crate::fetch::{FetchError, HttpClient};
use crate::models::{DiseaseStat, Region, TrendPoint};
use crate::repository::DatasetRepository;

const CDC_NNDSS_API: &str = "https://data.cdc.gov/resource/x9gk-5huc.json";
const NYC_COVID_API: &str = "https://data.cityofnewyork.us/resource/rc75-m7u3.json";
const DELPHI_FLU_API: &str = "https://api.delphi.cmu.edu/epidata/fluview/";

const NNDSS_SOURCE_URL: &str = "https://data.cdc.gov/NNDSS/NNDSS-Weekly-Data/x9gk-5huc";
const NYC_COVID_SOURCE_URL: &str =
    "https://data.cityofnewyork.us/Health/COVID-19-Daily-Counts-of-Cases-Hospitalizations-/rc75-m7u3";
const DELPHI_SOURCE_URL: &str = "https://github.com/cmu-delphi/delphi-epidata";

/// Conditions tracked on the dashboard, in display order.
const TRACKED_DISEASES: &[&str] = &[
    "Chikungunya virus disease",
    "Diphtheria",
    "Marburg virus disease",
    "Measles",
    "Mpox",
    "Influenza-associated pediatric mortality",
    "Novel Influenza A virus infections",
    "Pertussis",
    "Poliomyelitis, paralytic",
    "Rift Valley fever",
    "COVID-19",
];

#[derive(Debug, Deserialize)]
struct NndssRecord {
    #[serde(default)]
    label: String,
    #[serde(default)]
    m1: String,
    #[serde(default)]
    location1: String,
}

#[derive(Debug, Deserialize)]
struct NycCovidRecord {
    #[serde(default)]
    case_count: String,
    #[serde(default)]
    probable_case_count: String,
    #[serde(default)]
    date_of_interest: String,
}

#[derive(Debug, Deserialize)]
struct FluResponse {
    #[serde(default)]
    epidata: Vec<FluRecord>,
}

#[derive(Debug, Deserialize)]
struct FluRecord {
    #[serde(default)]
    num_ili: i64,
}

/// Adapter for the disease stats dataset.
#[derive(Clone)]
pub struct DiseaseSource {
    http: HttpClient,
    datasets: DatasetRepository,
}

impl DiseaseSource {
    pub fn new(http: HttpClient, datasets: DatasetRepository) -> Self {
        Self { http, datasets }
    }

    /// Current disease stats snapshot for a region.
    pub async fn get_data(&self, region: Region) -> Result<Vec<DiseaseStat>, SourceError> {
        Ok(self.datasets.disease_stats(region).await?)
    }

    async fn fetch_nndss(&self) -> Result<Vec<NndssRecord>, SourceError> {
        let url = format!(
            "{}?$where=({})&$order=year DESC, week DESC&$limit=5000",
            CDC_NNDSS_API,
            urlencoding::encode("location1='NEW YORK' OR location1='NEW YORK CITY'"),
        );
        match self.http.get_json::<Vec<NndssRecord>>(&url).await {
            Ok(records) => Ok(records),
            // An upstream error status degrades to an empty dataset;
            // transport failures propagate to the orchestrator.
            Err(FetchError::Status { status, .. }) => {
                warn!("NNDSS returned HTTP {}, treating as empty", status);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_nyc_covid(&self) -> Result<Vec<NycCovidRecord>, SourceError> {
        let url = format!(
            "{}?$limit=5&$order={}",
            NYC_COVID_API,
            urlencoding::encode("date_of_interest DESC"),
        );
        match self.http.get_json::<Vec<NycCovidRecord>>(&url).await {
            Ok(records) => Ok(records),
            Err(FetchError::Status { status, .. }) => {
                warn!("NYC COVID feed returned HTTP {}, treating as empty", status);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_flu(&self) -> Result<FluResponse, SourceError> {
        let url = format!("{}?regions=hhs2&epiweeks=202501", DELPHI_FLU_API);
        match self.http.get_json::<FluResponse>(&url).await {
            Ok(response) => Ok(response),
            Err(FetchError::Status { status, .. }) => {
                warn!("Delphi ILINet returned HTTP {}, treating as empty", status);
                Ok(FluResponse {
                    epidata: Vec::new(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn build_stats(
        nndss: &[NndssRecord],
        covid: &[NycCovidRecord],
        flu: &FluResponse,
    ) -> Vec<DiseaseStat> {
        let now = Utc::now().to_rfc3339();

        let mut covid_count = 0;
        let mut covid_date = now.clone();
        if let Some(latest) = covid.first() {
            covid_count =
                parse_lenient_i32(&latest.case_count) + parse_lenient_i32(&latest.probable_case_count);
            if !latest.date_of_interest.is_empty() {
                covid_date = latest.date_of_interest.clone();
            }
        }

        let flu_count = flu.epidata.first().map(|r| r.num_ili as i32).unwrap_or(0);

        let mut stats: Vec<DiseaseStat> = TRACKED_DISEASES
            .iter()
            .map(|&name| {
                let mut current = 0;

                if name == "COVID-19" && covid_count > 0 {
                    current = covid_count;
                } else {
                    // Accumulate NNDSS weekly counts for the New York area
                    for record in nndss {
                        if !record.location1.to_uppercase().contains("NEW YORK") {
                            continue;
                        }
                        if record.label.contains(name) || name.contains(record.label.as_str()) {
                            if record.m1 != "-" {
                                current += parse_lenient_i32(&record.m1);
                            }
                        }
                    }
                }

                let (unit, data_source, source_url) = if name.contains("COVID") && covid_count > 0 {
                    ("cases (daily)", "NYC Open Data", NYC_COVID_SOURCE_URL)
                } else {
                    ("cases (YTD)", "CDC NNDSS", NNDSS_SOURCE_URL)
                };

                let last_updated = if name.contains("COVID") {
                    covid_date.clone()
                } else {
                    now.clone()
                };

                DiseaseStat {
                    name: name.to_string(),
                    current_count: current,
                    week_ago: TrendPoint::stable(0),
                    month_ago: TrendPoint::stable(0),
                    two_months_ago: TrendPoint::stable(0),
                    year_ago: TrendPoint::stable(0),
                    unit: unit.to_string(),
                    last_updated,
                    data_source: data_source.to_string(),
                    source_url: source_url.to_string(),
                    region: Region::Nyc,
                }
            })
            .collect();

        if flu_count > 0 {
            stats.push(DiseaseStat {
                name: "Influenza (ILI)".to_string(),
                current_count: flu_count,
                week_ago: TrendPoint::stable(0),
                month_ago: TrendPoint::stable(0),
                two_months_ago: TrendPoint::stable(0),
                year_ago: TrendPoint::stable(0),
                unit: "outpatient visits".to_string(),
                last_updated: now,
                data_source: "CDC ILINet (Delphi)".to_string(),
                source_url: DELPHI_SOURCE_URL.to_string(),
                region: Region::Nyc,
            });
        }

        stats
    }
}

#[async_trait::async_trait]
impl DataSource for DiseaseSource {
    fn name(&self) -> &'static str {
        "disease"
    }

    async fn sync_data(&self) -> Result<usize, SourceError> {
        let (nndss, covid, flu) = tokio::join!(
            self.fetch_nndss(),
            self.fetch_nyc_covid(),
            self.fetch_flu()
        );
        let (nndss, covid, flu) = (nndss?, covid?, flu?);

        let stats = Self::build_stats(&nndss, &covid, &flu);
        self.datasets.replace_disease_stats(&stats).await?;

        Ok(stats.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nndss(label: &str, m1: &str, location: &str) -> NndssRecord {
        NndssRecord {
            label: label.to_string(),
            m1: m1.to_string(),
            location1: location.to_string(),
        }
    }

    #[test]
    fn test_build_stats_accumulates_nndss_counts() {
        let records = vec![
            nndss("Measles", "3", "NEW YORK"),
            nndss("Measles", "2", "NEW YORK CITY"),
            nndss("Measles", "9", "CALIFORNIA"),
            nndss("Pertussis", "-", "NEW YORK"),
        ];
        let stats = DiseaseSource::build_stats(&records, &[], &FluResponse { epidata: vec![] });

        let measles = stats.iter().find(|s| s.name == "Measles").unwrap();
        assert_eq!(measles.current_count, 5);

        // Placeholder "-" counts as zero
        let pertussis = stats.iter().find(|s| s.name == "Pertussis").unwrap();
        assert_eq!(pertussis.current_count, 0);

        // Every tracked disease gets a row even with no data
        assert_eq!(stats.len(), TRACKED_DISEASES.len());
    }

    #[test]
    fn test_build_stats_prefers_nyc_covid_feed() {
        let covid = vec![NycCovidRecord {
            case_count: "120".to_string(),
            probable_case_count: "30".to_string(),
            date_of_interest: "2025-06-14T00:00:00".to_string(),
        }];
        // NNDSS also carries a COVID row that must be ignored
        let records = vec![nndss("COVID-19", "999", "NEW YORK")];

        let stats =
            DiseaseSource::build_stats(&records, &covid, &FluResponse { epidata: vec![] });
        let covid_stat = stats.iter().find(|s| s.name == "COVID-19").unwrap();
        assert_eq!(covid_stat.current_count, 150);
        assert_eq!(covid_stat.unit, "cases (daily)");
        assert_eq!(covid_stat.data_source, "NYC Open Data");
        assert_eq!(covid_stat.last_updated, "2025-06-14T00:00:00");
    }

    #[test]
    fn test_build_stats_appends_ili_row() {
        let flu = FluResponse {
            epidata: vec![FluRecord { num_ili: 423 }],
        };
        let stats = DiseaseSource::build_stats(&[], &[], &flu);

        let ili = stats.iter().find(|s| s.name == "Influenza (ILI)").unwrap();
        assert_eq!(ili.current_count, 423);
        assert_eq!(ili.unit, "outpatient visits");
        assert_eq!(stats.len(), TRACKED_DISEASES.len() + 1);
    }

    #[test]
    fn test_build_stats_trends_are_stable_placeholders() {
        let stats = DiseaseSource::build_stats(&[], &[], &FluResponse { epidata: vec![] });
        for stat in &stats {
            assert_eq!(stat.week_ago.count, 0);
            assert_eq!(stat.week_ago.trend, "stable");
            assert_eq!(stat.year_ago.percent_change, 0.0);
        }
    }

    #[test]
    fn test_malformed_covid_counts_treated_as_zero() {
        let covid = vec![NycCovidRecord {
            case_count: "garbage".to_string(),
            probable_case_count: String::new(),
            date_of_interest: String::new(),
        }];
        let stats = DiseaseSource::build_stats(&[], &covid, &FluResponse { epidata: vec![] });
        let covid_stat = stats.iter().find(|s| s.name == "COVID-19").unwrap();
        assert_eq!(covid_stat.current_count, 0);
        // Zero count falls back to NNDSS attribution
        assert_eq!(covid_stat.data_source, "CDC NNDSS");
    }
}
