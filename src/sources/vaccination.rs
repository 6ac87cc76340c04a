//! Vaccination coverage adapter.
//!
//! Two upstreams feed this dataset: the NYS respiratory-season dose API
//! (flu and COVID weekly dose counts) and the NYC childhood immunization
//! CSV, pulled through the CSV download cache. Each writes its own region
//! scope so a failure in one never clobbers the other's snapshot.

use csv::ReaderBuilder;
use serde::Deserialize;

use super::{parse_lenient_f64, DataSource, SourceError};
use crate::csvcache::CsvCache;
use crate::fetch::HttpClient;
use crate::models::{CalculationDetails, Region, VaccinationData, VaccinationRecord};
use crate::repository::DatasetRepository;

const NYS_VAX_API: &str = "https://health.data.ny.gov/resource/xrhr-cy84.json";
const CHILDHOOD_DATA_URL: &str =
    "https://raw.githubusercontent.com/nychealth/immunization-data/main/demo/Main_Routine_Vaccine_Demo.csv";

/// NYS population excluding NYC, the denominator for state dose rates.
const NYS_POP_EXCLUDING_NYC: f64 = 11_600_000.0;

/// Coverage reporting year and quarter currently published upstream.
const COVERAGE_YEAR: &str = "2025";
const COVERAGE_QUARTER: &str = "Q2";

/// Map upstream vaccine group codes to display names.
fn display_name(group: &str) -> &str {
    match group {
        "DTaP" => "DTaP (Diphtheria, Tetanus, Pertussis)",
        "Polio" => "IPV (Inactivated Polio Vaccine)",
        "MMR" => "MMR (Measles, Mumps, Rubella)",
        "Varicella" => "Varicella (Chickenpox)",
        "HepB" => "Hepatitis B",
        "Hib" => "Hib (Haemophilus influenzae type b)",
        "PCV" => "PCV (Pneumococcal Conjugate)",
        "4313314" | "4:3:1:3:3:1:4" => "Combined 7-Vaccine Series (4:3:1:3:3:1:4)",
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct NysDoseRecord {
    #[serde(default)]
    week_ending: String,
    #[serde(default)]
    respiratory_season: String,
    #[serde(default)]
    covid_19_dose_count: String,
    #[serde(default)]
    influenza_dose_count: String,
}

#[derive(Debug, Deserialize)]
struct ChildhoodRow {
    #[serde(rename = "VACCINE_GROUP", default)]
    vaccine_group: String,
    #[serde(rename = "YEAR_COVERAGE", default)]
    year_coverage: String,
    #[serde(rename = "QUARTER", default)]
    quarter: String,
    #[serde(rename = "COUNT_PEOPLE_VAC", default)]
    count_people_vac: String,
    #[serde(rename = "POP_DENOMINATOR", default)]
    pop_denominator: String,
    #[serde(rename = "PERC_VAC", default)]
    perc_vac: String,
}

#[derive(Default)]
struct GroupAccumulator {
    weighted_perc_sum: f64,
    total_pop: f64,
    total_vaccinated: f64,
}

/// Adapter for the vaccination dataset.
#[derive(Clone)]
pub struct VaccinationSource {
    http: HttpClient,
    csv_cache: CsvCache,
    datasets: DatasetRepository,
}

impl VaccinationSource {
    pub fn new(http: HttpClient, csv_cache: CsvCache, datasets: DatasetRepository) -> Self {
        Self {
            http,
            csv_cache,
            datasets,
        }
    }

    /// Current vaccination snapshot grouped by region.
    ///
    /// NYS seasonal flu/COVID records are mirrored into the NYC list, which
    /// the dashboard shows alongside childhood coverage.
    pub async fn get_data(&self) -> Result<VaccinationData, SourceError> {
        let records = self.datasets.vaccination_records().await?;

        let mut nyc = Vec::new();
        let mut nys = Vec::new();
        for (region, record) in records {
            match region {
                Region::Nyc => nyc.push(record),
                _ => nys.push(record),
            }
        }

        let mirrored: Vec<VaccinationRecord> = nys
            .iter()
            .filter(|r| r.name.contains("COVID") || r.name.contains("Influenza"))
            .cloned()
            .collect();
        nyc.extend(mirrored);

        Ok(VaccinationData { nyc, nys })
    }

    /// Sync NYS weekly flu/COVID dose counts (rest-of-state scope).
    async fn sync_nys_doses(&self) -> Result<usize, SourceError> {
        let url = format!(
            "{}?geography_level={}&$limit=1000",
            NYS_VAX_API,
            urlencoding::encode("REST OF STATE"),
        );
        let data: Vec<NysDoseRecord> = self.http.get_json(&url).await?;

        let mut covid_total = 0.0;
        let mut flu_total = 0.0;
        for record in &data {
            covid_total += parse_lenient_f64(&record.covid_19_dose_count);
            flu_total += parse_lenient_f64(&record.influenza_dose_count);
        }

        // Latest week determines the reporting season label
        let latest = data.iter().max_by_key(|r| r.week_ending.clone());
        let latest_date = latest
            .map(|r| r.week_ending.split('T').next().unwrap_or("").to_string())
            .unwrap_or_default();
        let season = latest
            .map(|r| r.respiratory_season.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "2024-2025".to_string());
        let as_of = format!("{} Season (as of {})", season, latest_date);

        let records = vec![
            Self::seasonal_record(
                "COVID-19 (Seasonal Doses)",
                covid_total,
                &as_of,
                "Sum of weekly 'covid_19_dose_count' for REST OF STATE geography",
                &season,
            ),
            Self::seasonal_record(
                "Influenza (Seasonal Doses)",
                flu_total,
                &as_of,
                "Sum of weekly 'influenza_dose_count' for REST OF STATE geography",
                &season,
            ),
        ];

        self.datasets
            .replace_vaccination(Region::Nys, &records)
            .await?;
        Ok(records.len())
    }

    fn seasonal_record(
        name: &str,
        total: f64,
        as_of: &str,
        logic: &str,
        season: &str,
    ) -> VaccinationRecord {
        VaccinationRecord {
            name: name.to_string(),
            current_year: 0.0,
            five_years_ago: -1.0,
            ten_years_ago: -1.0,
            collection_method: Some(
                "NYS Immunization Information System (NYSIIS) - Weekly Aggregate Reports"
                    .to_string(),
            ),
            source_url: Some(NYS_VAX_API.to_string()),
            last_available_rate: Some(total),
            last_available_date: Some(as_of.to_string()),
            calculation_details: Some(CalculationDetails {
                numerator: total,
                denominator: NYS_POP_EXCLUDING_NYC,
                logic: logic.to_string(),
                source_location: format!(
                    "NYS Open Data API: geography_level='REST OF STATE', respiratory_season='{}'",
                    season
                ),
            }),
        }
    }

    /// Sync NYC childhood coverage from the cached CSV.
    async fn sync_childhood(&self) -> Result<usize, SourceError> {
        let fetch = self.csv_cache.get_cached_csv(CHILDHOOD_DATA_URL, false).await?;
        let records = Self::process_childhood_csv(&fetch.data)?;

        self.datasets
            .replace_vaccination(Region::Nyc, &records)
            .await?;
        Ok(records.len())
    }

    /// Aggregate per-demographic coverage rows into one weighted rate per
    /// vaccine group.
    fn process_childhood_csv(data: &str) -> Result<Vec<VaccinationRecord>, SourceError> {
        let mut reader = ReaderBuilder::new().from_reader(data.as_bytes());
        let mut groups: Vec<(String, GroupAccumulator)> = Vec::new();

        for row in reader.deserialize::<ChildhoodRow>() {
            let row = match row {
                Ok(row) => row,
                // A malformed row is absent, not fatal
                Err(_) => continue,
            };

            if row.year_coverage != COVERAGE_YEAR {
                continue;
            }
            if !row.quarter.is_empty() && row.quarter != COVERAGE_QUARTER {
                continue;
            }

            let pop = parse_lenient_f64(&row.pop_denominator);
            let perc = parse_lenient_f64(&row.perc_vac);
            let vaccinated = parse_lenient_f64(&row.count_people_vac);

            let idx = match groups.iter().position(|(name, _)| *name == row.vaccine_group) {
                Some(idx) => idx,
                None => {
                    groups.push((row.vaccine_group.clone(), GroupAccumulator::default()));
                    groups.len() - 1
                }
            };
            let group = &mut groups[idx].1;

            if pop > 0.0 {
                group.weighted_perc_sum += perc * pop;
                group.total_pop += pop;
            }
            group.total_vaccinated += vaccinated;
        }

        Ok(groups
            .into_iter()
            .map(|(name, acc)| {
                let rate = if acc.total_pop > 0.0 {
                    acc.weighted_perc_sum / acc.total_pop
                } else {
                    0.0
                };
                let rate = (rate * 10.0).round() / 10.0;

                VaccinationRecord {
                    name: display_name(&name).to_string(),
                    current_year: rate,
                    five_years_ago: -1.0,
                    ten_years_ago: -1.0,
                    collection_method: Some(
                        "NYC Citywide Immunization Registry (CIR)".to_string(),
                    ),
                    source_url: Some(CHILDHOOD_DATA_URL.to_string()),
                    last_available_rate: Some(rate),
                    last_available_date: Some(format!("{} {}", COVERAGE_YEAR, COVERAGE_QUARTER)),
                    calculation_details: Some(CalculationDetails {
                        numerator: acc.total_vaccinated,
                        denominator: acc.total_pop,
                        logic: "Weighted average of validated rates from source data across demographic groups"
                            .to_string(),
                        source_location: format!(
                            "NYC Health GitHub CSV. Vaccine: {}, Period: {} {}",
                            name, COVERAGE_YEAR, COVERAGE_QUARTER
                        ),
                    }),
                }
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl DataSource for VaccinationSource {
    fn name(&self) -> &'static str {
        "vaccination"
    }

    async fn sync_data(&self) -> Result<usize, SourceError> {
        let (nys, childhood) = tokio::join!(self.sync_nys_doses(), self.sync_childhood());
        Ok(nys? + childhood?)
    }
}
