//! HTTP request handlers for the web server.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::ws::PushEvent;
use super::AppState;
use crate::models::{
    CacheStats, DiseaseStat, NewsData, Region, VaccinationData, WastewaterSnapshot,
};

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

/// GET /api/status
pub async fn api_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.environment.clone(),
    })
}

#[derive(Serialize)]
struct DiseaseStatsByRegion {
    nyc: Vec<DiseaseStat>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheMetadata {
    last_fetched: String,
    csv_cache: CacheStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardResponse {
    vaccination_data: VaccinationData,
    disease_stats: DiseaseStatsByRegion,
    wastewater_data: WastewaterSnapshot,
    news_data: NewsData,
    cache_metadata: CacheMetadata,
}

/// GET /api/dashboard
///
/// Reads the current store snapshot; never triggers a sync.
pub async fn api_dashboard(State(state): State<AppState>) -> Response {
    let (vaccination, disease, wastewater, news, cache_stats) = tokio::join!(
        state.vaccination.get_data(),
        state.disease.get_data(Region::Nyc),
        state.wastewater.get_data(),
        state.news.get_data(),
        state.csv_cache.stats(),
    );

    let response = (|| -> Result<DashboardResponse, String> {
        Ok(DashboardResponse {
            vaccination_data: vaccination.map_err(|e| e.to_string())?,
            disease_stats: DiseaseStatsByRegion {
                nyc: disease.map_err(|e| e.to_string())?,
            },
            wastewater_data: wastewater.map_err(|e| e.to_string())?,
            news_data: news.map_err(|e| e.to_string())?,
            cache_metadata: CacheMetadata {
                last_fetched: Utc::now().to_rfc3339(),
                csv_cache: cache_stats.map_err(|e| e.to_string())?,
            },
        })
    })();

    match response {
        Ok(dashboard) => Json(dashboard).into_response(),
        Err(e) => {
            error!("Failed to assemble dashboard snapshot: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal Server Error" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    admin: bool,
}

/// POST /api/refresh?admin=<bool>
///
/// Returns the admission decision only; an accepted sync runs in the
/// background. 429 maps to a rejected request.
pub async fn api_refresh(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(params): Query<RefreshParams>,
) -> Response {
    let ip = client_ip(&headers, connect_info.as_ref());

    let decision = match state.sync.request_manual_refresh(&ip, params.admin).await {
        Ok(decision) => decision,
        Err(e) => {
            error!("Manual refresh admission failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal Server Error" })),
            )
                .into_response();
        }
    };

    if decision.is_rejected() {
        return (StatusCode::TOO_MANY_REQUESTS, Json(decision)).into_response();
    }

    // Notify push-channel subscribers; nobody listening is fine
    let _ = state.events.send(PushEvent::SyncStatus {
        status: decision.status().to_string(),
        message: decision.message().to_string(),
    });

    Json(decision).into_response()
}

/// Resolve the caller's IP from proxy headers or the socket address.
fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| connect_info.map(|info| info.0.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
