//! Normalized, source-agnostic dataset records.
//!
//! These are the shapes written by the source adapters and read by the
//! dashboard API. Serialization uses the camelCase keys the dashboard
//! client expects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic scope of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Nyc,
    Nys,
    Usa,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nyc => "nyc",
            Self::Nys => "nys",
            Self::Usa => "usa",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "nyc" => Some(Self::Nyc),
            "nys" => Some(Self::Nys),
            "usa" => Some(Self::Usa),
            _ => None,
        }
    }
}

/// A historical comparison point on a disease stat.
///
/// Trend deltas are out of scope; counts are stored but the trend and
/// percent change are always the stable/zero placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub count: i32,
    pub trend: String,
    pub percent_change: f64,
}

impl TrendPoint {
    pub fn stable(count: i32) -> Self {
        Self {
            count,
            trend: "stable".to_string(),
            percent_change: 0.0,
        }
    }
}

/// Normalized disease surveillance stat for one condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseStat {
    pub name: String,
    pub current_count: i32,
    pub week_ago: TrendPoint,
    pub month_ago: TrendPoint,
    pub two_months_ago: TrendPoint,
    pub year_ago: TrendPoint,
    pub unit: String,
    pub last_updated: String,
    pub data_source: String,
    pub source_url: String,
    pub region: Region,
}

impl DiseaseStat {
    /// Build a stat with placeholder trend points around a current count.
    pub fn new(name: &str, current_count: i32, unit: &str, last_updated: &str) -> Self {
        Self {
            name: name.to_string(),
            current_count,
            week_ago: TrendPoint::stable(0),
            month_ago: TrendPoint::stable(0),
            two_months_ago: TrendPoint::stable(0),
            year_ago: TrendPoint::stable(0),
            unit: unit.to_string(),
            last_updated: last_updated.to_string(),
            data_source: String::new(),
            source_url: String::new(),
            region: Region::Nyc,
        }
    }
}

/// Wastewater alert severity derived from average concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "moderate" => Some(Self::Moderate),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// One wastewater surveillance sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WastewaterSample {
    pub date: String,
    pub location: String,
    pub concentration: f64,
    pub trend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pathogen: Option<String>,
}

/// Full wastewater dataset snapshot with summary fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WastewaterSnapshot {
    pub samples: Vec<WastewaterSample>,
    pub average_concentration: f64,
    pub trend: String,
    pub alert_level: AlertLevel,
    pub last_updated: String,
    pub pathogens: Vec<String>,
}

impl WastewaterSnapshot {
    /// Empty snapshot served when no data has been synced yet.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            samples: Vec::new(),
            average_concentration: 0.0,
            trend: "stable".to_string(),
            alert_level: AlertLevel::Low,
            last_updated: now.to_rfc3339(),
            pathogens: Vec::new(),
        }
    }
}

/// How a vaccination coverage figure was derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationDetails {
    pub numerator: f64,
    pub denominator: f64,
    pub logic: String,
    pub source_location: String,
}

/// Normalized vaccination coverage record for one vaccine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccinationRecord {
    pub name: String,
    pub current_year: f64,
    pub five_years_ago: f64,
    pub ten_years_ago: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_available_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_available_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_details: Option<CalculationDetails>,
}

/// Vaccination records grouped by region for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct VaccinationData {
    pub nyc: Vec<VaccinationRecord>,
    pub nys: Vec<VaccinationRecord>,
}

/// A public health news alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsAlert {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub date: String,
    pub severity: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub region: Region,
}

/// News alerts grouped by region.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsData {
    pub nyc: Vec<NewsAlert>,
    pub nys: Vec<NewsAlert>,
    pub usa: Vec<NewsAlert>,
    pub last_updated: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_roundtrip() {
        for r in [Region::Nyc, Region::Nys, Region::Usa] {
            assert_eq!(Region::from_str(r.as_str()), Some(r));
        }
        assert_eq!(Region::from_str("nj"), None);
    }

    #[test]
    fn test_alert_level_roundtrip() {
        for level in [
            AlertLevel::Low,
            AlertLevel::Moderate,
            AlertLevel::High,
            AlertLevel::Critical,
        ] {
            assert_eq!(AlertLevel::from_str(level.as_str()), Some(level));
        }
    }

    #[test]
    fn test_trend_point_stable() {
        let point = TrendPoint::stable(42);
        assert_eq!(point.count, 42);
        assert_eq!(point.trend, "stable");
        assert_eq!(point.percent_change, 0.0);
    }

    #[test]
    fn test_disease_stat_serialization() {
        let stat = DiseaseStat::new("Measles", 12, "cases (YTD)", "2025-06-01");
        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["currentCount"], 12);
        assert_eq!(json["weekAgo"]["trend"], "stable");
        assert_eq!(json["region"], "nyc");
    }

    #[test]
    fn test_empty_wastewater_snapshot() {
        let snapshot = WastewaterSnapshot::empty(Utc::now());
        assert!(snapshot.samples.is_empty());
        assert_eq!(snapshot.alert_level, AlertLevel::Low);
        assert_eq!(snapshot.average_concentration, 0.0);
    }

    #[test]
    fn test_vaccination_record_skips_absent_fields() {
        let record = VaccinationRecord {
            name: "MMR (Measles, Mumps, Rubella)".to_string(),
            current_year: 91.5,
            five_years_ago: -1.0,
            ten_years_ago: -1.0,
            collection_method: None,
            source_url: None,
            last_available_rate: None,
            last_available_date: None,
            calculation_details: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["currentYear"], 91.5);
        assert!(json.get("collectionMethod").is_none());
    }
}
