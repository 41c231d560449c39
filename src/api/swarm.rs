use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::{error::ApiError, response::ApiResponse, MonitorState};
use crate::runners::RunnerState;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SwarmRequest {
    #[validate(range(min = 1))]
    pub locust_count: Option<u32>,
    #[validate(range(min = 1))]
    pub hatch_rate: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RunnerAck {
    pub state: RunnerState,
    pub user_count: u32,
}

impl RunnerAck {
    fn of(state: &MonitorState) -> Self {
        Self {
            state: state.runner.state(),
            user_count: state.runner.user_count(),
        }
    }
}

/// POST /swarm - (re)start hatching
///
/// Counters are reset unless a run is already in progress.
pub async fn swarm(
    State(state): State<MonitorState>,
    Json(request): Json<SwarmRequest>,
) -> Result<ApiResponse<RunnerAck>, ApiError> {
    request.validate()?;

    let fresh_run = !matches!(
        state.runner.state(),
        RunnerState::Hatching | RunnerState::Running
    );
    state
        .runner
        .start_hatching(request.locust_count, request.hatch_rate)
        .await?;
    if fresh_run {
        state.stats.reset();
    }

    info!(
        locust_count = ?request.locust_count,
        hatch_rate = ?request.hatch_rate,
        "swarm requested from web monitor"
    );
    Ok(ApiResponse::success(RunnerAck::of(&state)).with_message("Swarming started"))
}

/// GET /stop - stop all users
pub async fn stop(State(state): State<MonitorState>) -> ApiResponse<RunnerAck> {
    state.runner.stop().await;
    info!("stop requested from web monitor");
    ApiResponse::success(RunnerAck::of(&state)).with_message("Test stopped")
}
