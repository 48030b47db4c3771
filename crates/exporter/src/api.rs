//! HTTP API for Lustre metrics and health checks
//!
//! Routes: `/` (landing page), the telemetry path (default `/metrics`),
//! `/healthz` and `/readyz`. There is no `/-/exit` route; stop the process
//! with a signal instead.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use exporter_lib::{
    exposition::encode_text,
    health::{ComponentStatus, HealthRegistry},
    Scheduler,
};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub health_registry: HealthRegistry,
    pub telemetry_path: String,
}

impl AppState {
    pub fn new(
        scheduler: Arc<Scheduler>,
        health_registry: HealthRegistry,
        telemetry_path: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            health_registry,
            telemetry_path: telemetry_path.into(),
        }
    }
}

/// Landing page linking to the telemetry path
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>Lustre Exporter</title></head>\n<body>\n\
         <h1>Lustre Exporter</h1>\n<p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n</html>\n",
        state.telemetry_path
    ))
}

/// Lustre samples, the duration summary and the process registry
///
/// A failing source only drops its own series; the scrape still succeeds.
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let mut families = state.scheduler.update().await;
    families.extend(prometheus::gather());

    match encode_text(&families) {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route(&state.telemetry_path, get(metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: String, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use exporter_lib::collector::{load_sources, JobStatsPool};
    use exporter_lib::{CollectorConfig, SchedulerBuilder};
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const OST: &str = "lustrefs-OST0000";

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn setup_test_app(temp_dir: &TempDir, telemetry_path: &str) -> (Router, Arc<AppState>) {
        let proc_root = temp_dir.path().join("proc");
        let sys_root = temp_dir.path().join("sys");
        let ost = proc_root.join("fs/lustre/obdfilter").join(OST);
        write(&ost.join("blocksize"), "4096\n");
        write(&ost.join("stats"), "snapshot_time 1500000000.0 secs.usecs\nping 141 samples [reqs]\n");
        write(&sys_root.join("fs/lustre/health_check"), "healthy\n");

        let collector = CollectorConfig {
            proc_path: proc_root,
            sys_path: sys_root,
            ..CollectorConfig::default()
        };
        let pool = Arc::new(JobStatsPool::default());
        let sources = load_sources(&["procfs", "sysfs"], &collector, Arc::clone(&pool)).unwrap();

        let health_registry = HealthRegistry::new();
        let scheduler = SchedulerBuilder::new()
            .sources(sources)
            .pool(pool)
            .health(health_registry.clone())
            .build()
            .unwrap();
        scheduler.register_health().await;

        let state = Arc::new(AppState::new(scheduler, health_registry, telemetry_path));
        (create_router(Arc::clone(&state)), state)
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = setup_test_app(&temp_dir, "/metrics").await;

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));

        let body = body_text(response).await;
        assert!(body.contains(&format!(
            "lustre_blocksize_bytes{{component=\"ost\",target=\"{OST}\"}} 4096"
        )));
        assert!(body.contains(&format!(
            "lustre_stats_total{{component=\"ost\",target=\"{OST}\",operation=\"ping\"}} 141"
        )));
        assert!(body.contains("# TYPE lustre_exporter_scrape_duration_seconds summary"));
        assert!(body.contains("lustre_exporter_passes_started_total"));
    }

    #[tokio::test]
    async fn test_custom_telemetry_path() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = setup_test_app(&temp_dir, "/lustre").await;

        let response = app
            .clone()
            .oneshot(get_request("/lustre"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_no_exit_route() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = setup_test_app(&temp_dir, "/metrics").await;

        let response = app.oneshot(get_request("/-/exit")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_links_telemetry_path() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = setup_test_app(&temp_dir, "/lustre").await;

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("<a href=\"/lustre\">"));
    }

    #[tokio::test]
    async fn test_partial_failure_still_serves_metrics() {
        let temp_dir = TempDir::new().unwrap();
        let (app, state) = setup_test_app(&temp_dir, "/metrics").await;
        // unreadable file: a directory in its place
        std::fs::create_dir_all(
            temp_dir
                .path()
                .join("proc/fs/lustre/obdfilter")
                .join(OST)
                .join("kbytesfree"),
        )
        .unwrap();

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(!body.contains("lustre_blocksize_bytes{"));
        assert!(body.contains("lustre_health_check{component=\"health\""));
        assert!(body.contains("result=\"error\",source=\"procfs\""));

        // health is recorded by the pass driver once waiters are released
        for _ in 0..100 {
            if state.health_registry.health().await.status == ComponentStatus::Degraded {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let health = state.health_registry.health().await;
        assert_eq!(health.components["procfs"].status, ComponentStatus::Degraded);
        assert_eq!(health.components["sysfs"].status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_malformed_file_drops_only_its_series() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = setup_test_app(&temp_dir, "/metrics").await;
        write(
            &temp_dir
                .path()
                .join("proc/fs/lustre/obdfilter")
                .join(OST)
                .join("blocksize"),
            "not-a-number\n",
        );

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(!body.contains("lustre_blocksize_bytes{"));
        assert!(body.contains(&format!(
            "lustre_stats_total{{component=\"ost\",target=\"{OST}\",operation=\"ping\"}} 141"
        )));
        assert!(body.contains("result=\"success\",source=\"procfs\""));
        assert!(!body.contains("result=\"error\""));
    }

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = setup_test_app(&temp_dir, "/metrics").await;

        let response = app.oneshot(get_request("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
        assert!(body["components"]["procfs"].is_object());
    }

    #[tokio::test]
    async fn test_readyz_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let (app, state) = setup_test_app(&temp_dir, "/metrics").await;

        let response = app.clone().oneshot(get_request("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.health_registry.set_ready(true).await;
        let response = app.oneshot(get_request("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
