//! Sync run models for the append-only sync log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which dataset a sync run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Disease,
    Wastewater,
    Vaccination,
    News,
    All,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disease => "disease",
            Self::Wastewater => "wastewater",
            Self::Vaccination => "vaccination",
            Self::News => "news",
            Self::All => "all",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "disease" => Some(Self::Disease),
            "wastewater" => Some(Self::Wastewater),
            "vaccination" => Some(Self::Vaccination),
            "news" => Some(Self::News),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// What triggered a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Scheduled,
    Manual,
    Buffered,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Buffered => "buffered",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            "buffered" => Some(Self::Buffered),
            _ => None,
        }
    }
}

/// Lifecycle status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One attempt to refresh some or all datasets.
///
/// Rows are append-only: created in `running` status and updated exactly
/// once to a terminal status when the run settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i32,
    pub sync_type: SyncType,
    pub trigger: SyncTrigger,
    pub status: SyncStatus,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of a full sync pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub errors: Vec<String>,
}

impl SyncOutcome {
    /// Outcome for a sync rejected because one is already running.
    pub fn rejected() -> Self {
        Self {
            success: false,
            errors: vec!["Sync in progress".to_string()],
        }
    }
}
