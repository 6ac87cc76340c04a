//! Manual refresh buffering and rate limit tracking models.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

/// Truncate a timestamp to its hour-aligned rate limit window.
pub fn hour_window(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::hours(1)).unwrap_or(at)
}

/// The next hour boundary after `at`, used to schedule buffered requests.
pub fn next_hour_boundary(at: DateTime<Utc>) -> DateTime<Utc> {
    hour_window(at) + Duration::hours(1)
}

/// A deferred refresh request, created when a caller's hourly quota is
/// exhausted. At most one un-executed request exists per source IP.
#[derive(Debug, Clone, Serialize)]
pub struct ManualRefreshRequest {
    pub id: i32,
    pub request_id: String,
    pub source_ip: String,
    pub user_id: Option<String>,
    pub request_time: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub executed: bool,
    pub notification_sent: bool,
}

impl ManualRefreshRequest {
    /// Create a new buffered request scheduled for the next hour boundary.
    pub fn new(source_ip: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            request_id: format!("req_{}", uuid::Uuid::new_v4()),
            source_ip: source_ip.to_string(),
            user_id: None,
            request_time: now,
            scheduled_for: next_hour_boundary(now),
            executed: false,
            notification_sent: false,
        }
    }
}

/// Per-IP request counter for one hour-aligned window.
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    pub hour_window: DateTime<Utc>,
    pub source_ip: String,
    pub request_count: i32,
    pub last_request_time: DateTime<Utc>,
}

/// Admission decision for a manual refresh request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshDecision {
    /// The sync was started immediately.
    Scheduled { message: String },
    /// The request was deferred to the next rate limit window.
    Buffered {
        #[serde(rename = "scheduledTime")]
        scheduled_time: DateTime<Utc>,
        message: String,
    },
    /// The request was dropped: quota exhausted and a buffered request
    /// already exists for this IP.
    Rejected { message: String },
}

impl RefreshDecision {
    pub fn scheduled(message: &str) -> Self {
        Self::Scheduled {
            message: message.to_string(),
        }
    }

    pub fn buffered(scheduled_time: DateTime<Utc>) -> Self {
        Self::Buffered {
            scheduled_time,
            message: "Rate limit exceeded. Request buffered for next hour.".to_string(),
        }
    }

    pub fn rejected() -> Self {
        Self::Rejected {
            message: "Rate limit exceeded and buffer full. Please try again later.".to_string(),
        }
    }

    /// Whether this decision maps to HTTP 429.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// The status string used in API responses and push events.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Scheduled { .. } => "scheduled",
            Self::Buffered { .. } => "buffered",
            Self::Rejected { .. } => "rejected",
        }
    }

    /// Human-readable message for API responses and push events.
    pub fn message(&self) -> &str {
        match self {
            Self::Scheduled { message }
            | Self::Buffered { message, .. }
            | Self::Rejected { message } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hour_window_truncation() {
        let at = Utc.with_ymd_and_hms(2025, 6, 15, 14, 37, 22).unwrap();
        let window = hour_window(at);
        assert_eq!(window, Utc.with_ymd_and_hms(2025, 6, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_hour_window_already_aligned() {
        let at = Utc.with_ymd_and_hms(2025, 6, 15, 14, 0, 0).unwrap();
        assert_eq!(hour_window(at), at);
    }

    #[test]
    fn test_next_hour_boundary() {
        let at = Utc.with_ymd_and_hms(2025, 6, 15, 23, 59, 59).unwrap();
        assert_eq!(
            next_hour_boundary(at),
            Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_new_request_scheduled_for_next_window() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 14, 37, 0).unwrap();
        let req = ManualRefreshRequest::new("1.2.3.4", now);
        assert_eq!(req.source_ip, "1.2.3.4");
        assert!(!req.executed);
        assert!(req.request_id.starts_with("req_"));
        assert_eq!(
            req.scheduled_for,
            Utc.with_ymd_and_hms(2025, 6, 15, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_decision_status_strings() {
        assert_eq!(RefreshDecision::scheduled("ok").status(), "scheduled");
        assert_eq!(RefreshDecision::buffered(Utc::now()).status(), "buffered");
        assert_eq!(RefreshDecision::rejected().status(), "rejected");
        assert!(RefreshDecision::rejected().is_rejected());
        assert!(!RefreshDecision::scheduled("ok").is_rejected());
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_value(RefreshDecision::scheduled("Refresh started")).unwrap();
        assert_eq!(json["status"], "scheduled");
        assert_eq!(json["message"], "Refresh started");

        let at = Utc.with_ymd_and_hms(2025, 6, 15, 15, 0, 0).unwrap();
        let json = serde_json::to_value(RefreshDecision::buffered(at)).unwrap();
        assert_eq!(json["status"], "buffered");
        assert!(json["scheduledTime"].is_string());
    }
}
