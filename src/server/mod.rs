//! HTTP + WebSocket server for the dashboard client.
//!
//! Serves the aggregated dataset snapshot, accepts manual refresh
//! requests, and pushes sync status events to connected clients.

mod handlers;
mod routes;
mod ws;

pub use routes::create_router;
pub use ws::PushEvent;

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::Settings;
use crate::csvcache::CsvCache;
use crate::fetch::HttpClient;
use crate::repository::{
    AsyncSqlitePool, CsvCacheRepository, DatasetRepository, ManualRefreshRepository,
    RateLimitRepository, SyncLogRepository,
};
use crate::sources::{
    DataSource, DiseaseSource, NewsSource, VaccinationSource, WastewaterSource,
};
use crate::sync::{SyncPolicy, SyncService};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub disease: DiseaseSource,
    pub wastewater: WastewaterSource,
    pub vaccination: VaccinationSource,
    pub news: NewsSource,
    pub csv_cache: CsvCache,
    pub sync: SyncService,
    pub events: broadcast::Sender<PushEvent>,
    pub environment: String,
    pub ws_heartbeat_interval: Duration,
    pub ws_max_connections: usize,
    pub ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let pool = AsyncSqlitePool::from_path(&settings.database_path);
        let http = HttpClient::new(settings.request_timeout);

        let datasets = DatasetRepository::new(pool.clone());
        let csv_cache = CsvCache::new(
            CsvCacheRepository::new(pool.clone()),
            http.clone(),
            &settings.csv_cache_path,
        )?;

        let disease = DiseaseSource::new(http.clone(), datasets.clone());
        let wastewater = WastewaterSource::new(http.clone(), datasets.clone());
        let vaccination =
            VaccinationSource::new(http.clone(), csv_cache.clone(), datasets.clone());
        let news = NewsSource::new(http, datasets);

        let sources: Vec<Arc<dyn DataSource>> = vec![
            Arc::new(vaccination.clone()),
            Arc::new(disease.clone()),
            Arc::new(wastewater.clone()),
            Arc::new(news.clone()),
        ];

        let policy = SyncPolicy {
            max_per_hour: settings.manual_refresh_max_per_hour,
            admin_bypass_rate_limit: settings.admin_bypass_rate_limit,
            buffer_immediate_first_request: settings.buffer_immediate_first_request,
            schedule_time: settings.sync_schedule_time,
            timezone: settings.timezone,
        };
        let sync = SyncService::new(
            sources,
            SyncLogRepository::new(pool.clone()),
            ManualRefreshRepository::new(pool.clone()),
            RateLimitRepository::new(pool),
            policy,
        );

        let (events, _) = broadcast::channel(64);

        Ok(Self {
            disease,
            wastewater,
            vaccination,
            news,
            csv_cache,
            sync,
            events,
            environment: settings.environment.clone(),
            ws_heartbeat_interval: settings.ws_heartbeat_interval,
            ws_max_connections: settings.ws_max_connections,
            ws_connections: Arc::new(AtomicUsize::new(0)),
        })
    }
}

/// Start the web server.
///
/// Schedules the daily sync, replays any overdue buffered requests, and
/// serves until the process exits.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;

    // Startup sweep plus the recurring schedules
    state.sync.process_buffered_requests().await?;
    crate::sync::spawn_daily_sync(state.sync.clone());
    crate::sync::spawn_buffer_sweep(state.sync.clone());

    let app = create_router(state);
    let addr: SocketAddr = settings.bind_addr().parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::repository::run_migrations;

    async fn setup_test_app_with_settings(
        mutate: impl Fn(&mut Settings),
    ) -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();

        let mut settings = Settings::default();
        settings.database_path = dir.path().join("test.db");
        settings.csv_cache_path = dir.path().join("csv_cache");
        settings.environment = "test".to_string();
        mutate(&mut settings);

        run_migrations(&settings.database_url()).await.unwrap();

        let state = AppState::new(&settings).unwrap();
        (create_router(state), dir)
    }

    async fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        setup_test_app_with_settings(|_| {}).await
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = setup_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_api_status() {
        let (app, _dir) = setup_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "running");
        assert_eq!(json["environment"], "test");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_api_dashboard_empty_store() {
        let (app, _dir) = setup_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/dashboard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;

        // The last good snapshot is always served, even before any sync
        assert!(json["vaccinationData"]["nyc"].as_array().unwrap().is_empty());
        assert!(json["diseaseStats"]["nyc"].as_array().unwrap().is_empty());
        assert_eq!(json["wastewaterData"]["alertLevel"], "low");
        assert!(json["newsData"]["usa"].as_array().unwrap().is_empty());
        assert_eq!(json["cacheMetadata"]["csvCache"]["totalEntries"], 0);
        assert!(json["cacheMetadata"]["lastFetched"].is_string());
    }

    #[tokio::test]
    async fn test_refresh_degrades_scheduled_buffered_rejected() {
        let (app, _dir) = setup_test_app_with_settings(|settings| {
            settings.manual_refresh_max_per_hour = 1;
        })
        .await;

        let request = |app: axum::Router| async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/refresh")
                    .header("x-forwarded-for", "1.2.3.4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
        };

        let first = request(app.clone()).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_json(first).await["status"], "scheduled");

        let second = request(app.clone()).await;
        assert_eq!(second.status(), StatusCode::OK);
        let json = body_json(second).await;
        assert_eq!(json["status"], "buffered");
        assert!(json["scheduledTime"].is_string());

        let third = request(app.clone()).await;
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(third).await["status"], "rejected");
    }

    #[tokio::test]
    async fn test_refresh_unknown_ip_without_connect_info() {
        let (app, _dir) = setup_test_app().await;

        // No x-forwarded-for and no socket info: falls back to "unknown"
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
