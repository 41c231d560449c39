use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

use super::{response::ApiResponse, MonitorState};
use crate::{
    config::Topology, domain::ScenarioSummary, runners::RunnerState, stats::StatsSnapshot,
};

#[derive(Debug, Serialize)]
pub struct MonitorStatus {
    pub scenario: ScenarioSummary,
    pub topology: Topology,
    pub state: RunnerState,
    pub user_count: u32,
    pub num_clients: u32,
    pub hatch_rate: u32,
    pub uptime_seconds: i64,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RequestStatsReport {
    pub state: RunnerState,
    pub user_count: u32,
    #[serde(flatten)]
    pub snapshot: StatsSnapshot,
}

/// GET / - runner overview
pub async fn get_status(State(state): State<MonitorState>) -> ApiResponse<MonitorStatus> {
    ApiResponse::success(MonitorStatus {
        scenario: state.scenario.summary(),
        topology: state.runner.topology(),
        state: state.runner.state(),
        user_count: state.runner.user_count(),
        num_clients: state.num_clients,
        hatch_rate: state.hatch_rate,
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /stats/requests - per-task counters
pub async fn get_request_stats(
    State(state): State<MonitorState>,
) -> ApiResponse<RequestStatsReport> {
    ApiResponse::success(RequestStatsReport {
        state: state.runner.state(),
        user_count: state.runner.user_count(),
        snapshot: state.stats.snapshot(),
    })
}
