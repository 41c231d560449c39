//! Web monitor: a small JSON API to watch and drive the runner.

pub mod error;
pub mod response;
pub mod status;
pub mod swarm;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{domain::ScenarioClass, error::LaunchError, runners::Runner, stats::RequestStats};

#[derive(Clone)]
pub struct MonitorState {
    pub runner: Arc<dyn Runner>,
    pub scenario: Arc<ScenarioClass>,
    pub stats: RequestStats,
    pub num_clients: u32,
    pub hatch_rate: u32,
    pub started_at: DateTime<Utc>,
}

pub fn router(state: MonitorState) -> Router {
    Router::new()
        .route("/", get(status::get_status))
        .route("/stats/requests", get(status::get_request_stats))
        .route("/swarm", post(swarm::swarm))
        .route("/stop", get(swarm::stop))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the monitor's listener. Failing here aborts the launch.
pub async fn bind(addr: &str) -> Result<TcpListener, LaunchError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| LaunchError::WebMonitor {
            addr: addr.to_string(),
            source,
        })
}

/// Serve until `cancel` fires.
pub async fn serve(listener: TcpListener, state: MonitorState, cancel: CancellationToken) {
    let addr = listener.local_addr().ok();
    info!(addr = ?addr, "web monitor listening");
    let shutdown = async move { cancel.cancelled().await };
    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %e, "web monitor failed");
    }
    info!("web monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Topology,
        domain::LOCUST,
        runners::{MockRunner, RunnerError, RunnerState},
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use mockall::predicate::eq;
    use tower::ServiceExt;

    fn state(runner: MockRunner, stats: RequestStats) -> MonitorState {
        MonitorState {
            runner: Arc::new(runner),
            scenario: LOCUST.clone(),
            stats,
            num_clients: 10,
            hatch_rate: 2,
            started_at: Utc::now(),
        }
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn swarm_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/swarm")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_runner() {
        let mut runner = MockRunner::new();
        runner.expect_topology().return_const(Topology::Standalone);
        runner.expect_state().return_const(RunnerState::Ready);
        runner.expect_user_count().return_const(0u32);

        let response = router(state(runner, RequestStats::new()))
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["data"]["topology"], "standalone");
        assert_eq!(body["data"]["state"], "ready");
        assert_eq!(body["data"]["scenario"]["name"], "Locust");
        assert_eq!(body["data"]["num_clients"], 10);
    }

    #[tokio::test]
    async fn test_swarm_starts_hatching_and_resets_stats() {
        let stats = RequestStats::new();
        stats.log_execution("stale");

        let mut runner = MockRunner::new();
        let mut states = vec![RunnerState::Hatching, RunnerState::Ready];
        runner
            .expect_state()
            .returning(move || states.pop().unwrap_or(RunnerState::Hatching));
        runner
            .expect_start_hatching()
            .with(eq(Some(25)), eq(Some(5)))
            .times(1)
            .returning(|_, _| Ok(()));
        runner.expect_user_count().return_const(0u32);

        let response = router(state(runner, stats.clone()))
            .oneshot(swarm_request(r#"{"locust_count": 25, "hatch_rate": 5}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(stats.snapshot().entries.is_empty());

        let body = json(response).await;
        assert_eq!(body["message"], "Swarming started");
        assert_eq!(body["data"]["state"], "hatching");
    }

    #[tokio::test]
    async fn test_swarm_rejects_zero_count() {
        let runner = MockRunner::new();
        let response = router(state(runner, RequestStats::new()))
            .oneshot(swarm_request(r#"{"locust_count": 0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "ValidationError");
    }

    #[tokio::test]
    async fn test_swarm_without_slaves_is_unavailable() {
        let mut runner = MockRunner::new();
        runner.expect_state().return_const(RunnerState::Ready);
        runner
            .expect_start_hatching()
            .returning(|_, _| Err(RunnerError::NoWorkers));

        let response = router(state(runner, RequestStats::new()))
            .oneshot(swarm_request("{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stop_stops_runner() {
        let mut runner = MockRunner::new();
        runner.expect_stop().times(1).returning(|| ());
        runner.expect_state().return_const(RunnerState::Stopped);
        runner.expect_user_count().return_const(0u32);

        let response = router(state(runner, RequestStats::new()))
            .oneshot(Request::get("/stop").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["data"]["state"], "stopped");
    }

    #[tokio::test]
    async fn test_stats_route_serves_snapshot() {
        let stats = RequestStats::new();
        stats.log_execution("index");

        let mut runner = MockRunner::new();
        runner.expect_state().return_const(RunnerState::Running);
        runner.expect_user_count().return_const(1u32);

        let response = router(state(runner, stats))
            .oneshot(Request::get("/stats/requests").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["data"]["entries"][0]["name"], "index");
        assert_eq!(body["data"]["user_count"], 1);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = bind(&addr).await.unwrap_err();
        assert!(matches!(err, LaunchError::WebMonitor { .. }));
    }
}
